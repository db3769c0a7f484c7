//! `GraphAccess` over Neo4j.
//!
//! Each handle buffers its own write statements and applies them in one
//! explicit transaction on commit. A `Cached` handle shares the provider's
//! connection pool; a `Fresh` handle dials its own, so its reads never ride
//! on state held by the primary connection.

use std::collections::BTreeSet;

use async_trait::async_trait;
use groom_core::access::{ConnectionMode, GraphAccess, GraphProvider, KeyValues};
use groom_core::types::{Direction, Edge, EdgeId, PropertyValue, Vertex, VertexId};
use groom_core::GraphError;
use neo4rs::Query;
use tokio::sync::{Mutex, OnceCell};

use crate::client::{GraphClient, GraphConfig};
use crate::mutations;

pub struct Neo4jGraph {
    client: GraphClient,
    mode: ConnectionMode,
    pending: Mutex<Vec<Query>>,
}

impl Neo4jGraph {
    pub fn new(client: GraphClient, mode: ConnectionMode) -> Self {
        Self {
            client,
            mode,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    async fn push(&self, q: Query) {
        self.pending.lock().await.push(q);
    }
}

#[async_trait]
impl GraphAccess for Neo4jGraph {
    async fn vertex(&self, id: VertexId) -> Result<Option<Vertex>, GraphError> {
        Ok(self.client.fetch_vertex(id).await?)
    }

    async fn vertex_ids_of_type(&self, node_type: &str) -> Result<Vec<VertexId>, GraphError> {
        Ok(self.client.fetch_ids_of_type(node_type).await?)
    }

    async fn query_by_keys(
        &self,
        node_type: &str,
        keys: &KeyValues,
    ) -> Result<Vec<VertexId>, GraphError> {
        Ok(self.client.fetch_by_keys(node_type, keys).await?)
    }

    async fn children_by_keys(
        &self,
        parent: VertexId,
        node_type: &str,
        keys: &KeyValues,
    ) -> Result<Vec<VertexId>, GraphError> {
        Ok(self
            .client
            .fetch_children_by_keys(parent, node_type, keys)
            .await?)
    }

    async fn incident_edges(
        &self,
        id: VertexId,
        direction: Direction,
    ) -> Result<Vec<Edge>, GraphError> {
        Ok(self.client.fetch_incident_edges(id, direction).await?)
    }

    async fn neighbor_ids(&self, id: VertexId) -> Result<BTreeSet<VertexId>, GraphError> {
        Ok(self.client.fetch_neighbor_ids(id).await?)
    }

    async fn edge_ids(&self) -> Result<Vec<EdgeId>, GraphError> {
        Ok(self.client.fetch_edge_ids().await?)
    }

    async fn edge(&self, id: EdgeId) -> Result<Option<Edge>, GraphError> {
        Ok(self.client.fetch_edge(id).await?)
    }

    async fn delete_vertex(&self, id: VertexId) -> Result<(), GraphError> {
        self.push(mutations::delete_vertex(id)).await;
        Ok(())
    }

    async fn delete_edge(&self, id: EdgeId) -> Result<(), GraphError> {
        self.push(mutations::delete_edge(id)).await;
        Ok(())
    }

    async fn set_properties(
        &self,
        id: VertexId,
        properties: Vec<(String, PropertyValue)>,
    ) -> Result<(), GraphError> {
        if let Some(q) = mutations::set_properties(id, &properties) {
            self.push(q).await;
        }
        Ok(())
    }

    async fn commit(&self) -> Result<(), GraphError> {
        let batch = std::mem::take(&mut *self.pending.lock().await);
        Ok(self.client.run_in_txn(batch).await?)
    }

    async fn rollback(&self) -> Result<(), GraphError> {
        let dropped = std::mem::take(&mut *self.pending.lock().await).len();
        if dropped > 0 {
            tracing::debug!(statements = dropped, "Discarded buffered statements");
        }
        Ok(())
    }

    async fn pending_mutations(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Opens Neo4j handles. The shared pool is dialled lazily on the first
/// `Cached` open.
pub struct Neo4jProvider {
    config: GraphConfig,
    shared: OnceCell<GraphClient>,
}

impl Neo4jProvider {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            shared: OnceCell::new(),
        }
    }
}

#[async_trait]
impl GraphProvider for Neo4jProvider {
    type Handle = Neo4jGraph;

    async fn open(&self, mode: ConnectionMode) -> Result<Neo4jGraph, GraphError> {
        let client = match mode {
            ConnectionMode::Cached => self
                .shared
                .get_or_try_init(|| GraphClient::connect(&self.config))
                .await?
                .clone(),
            ConnectionMode::Fresh => GraphClient::connect(&self.config).await?,
        };
        tracing::debug!(?mode, "Opened graph handle");
        Ok(Neo4jGraph::new(client, mode))
    }
}
