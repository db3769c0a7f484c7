//! The minimal graph-store interface the grooming engine consumes.
//!
//! Reads are immediate. Mutations are buffered per handle and only reach the
//! store on [`GraphAccess::commit`]; [`GraphAccess::rollback`] discards them.
//! Two handles never share buffered mutations.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::GraphError;
use crate::types::{Direction, Edge, EdgeId, PropertyValue, Vertex, VertexId};

/// Key property name/value pairs, in the node type's key order.
pub type KeyValues = [(String, PropertyValue)];

#[async_trait]
pub trait GraphAccess: Send + Sync {
    /// Fetch a vertex by internal id.
    async fn vertex(&self, id: VertexId) -> Result<Option<Vertex>, GraphError>;

    /// Vertices the store's type index files under `node_type`.
    async fn vertex_ids_of_type(&self, node_type: &str) -> Result<Vec<VertexId>, GraphError>;

    /// Index-driven lookup of `node_type` vertices by key values.
    async fn query_by_keys(
        &self,
        node_type: &str,
        keys: &KeyValues,
    ) -> Result<Vec<VertexId>, GraphError>;

    /// Vertices contained by `parent` that the index resolves under
    /// `node_type` with the given key values.
    async fn children_by_keys(
        &self,
        parent: VertexId,
        node_type: &str,
        keys: &KeyValues,
    ) -> Result<Vec<VertexId>, GraphError>;

    async fn incident_edges(
        &self,
        id: VertexId,
        direction: Direction,
    ) -> Result<Vec<Edge>, GraphError>;

    /// Every vertex connected to `id` by any edge in either direction.
    async fn neighbor_ids(&self, id: VertexId) -> Result<BTreeSet<VertexId>, GraphError>;

    async fn edge_ids(&self) -> Result<Vec<EdgeId>, GraphError>;

    async fn edge(&self, id: EdgeId) -> Result<Option<Edge>, GraphError>;

    /// Queue deletion of a vertex together with its incident edges.
    async fn delete_vertex(&self, id: VertexId) -> Result<(), GraphError>;

    async fn delete_edge(&self, id: EdgeId) -> Result<(), GraphError>;

    async fn set_properties(
        &self,
        id: VertexId,
        properties: Vec<(String, PropertyValue)>,
    ) -> Result<(), GraphError>;

    /// Apply all buffered mutations atomically.
    async fn commit(&self) -> Result<(), GraphError>;

    /// Discard all buffered mutations.
    async fn rollback(&self) -> Result<(), GraphError>;

    /// Number of mutations buffered since the last commit or rollback.
    async fn pending_mutations(&self) -> usize;
}

/// How a handle's underlying connection is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// May reuse a shared, already-open connection.
    Cached,
    /// Must open a brand-new connection.
    Fresh,
}

/// Source of graph handles.
#[async_trait]
pub trait GraphProvider: Send + Sync {
    type Handle: GraphAccess;

    async fn open(&self, mode: ConnectionMode) -> Result<Self::Handle, GraphError>;
}
