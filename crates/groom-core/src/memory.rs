//! In-memory graph store.
//!
//! Keeps vertex data and its secondary indexes in separate structures so the
//! kinds of drift the engine repairs can be represented: a type index entry
//! that outlived its discriminator, a vertex missing from the key index, an
//! edge whose endpoint is gone. Used by tests and by embedders that want to
//! groom a graph they already hold in memory.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::access::{ConnectionMode, GraphAccess, GraphProvider, KeyValues};
use crate::error::GraphError;
use crate::types::{
    Direction, Edge, EdgeId, EdgeMarker, Properties, PropertyValue, Vertex, VertexId, NODE_TYPE,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_vertex: i64,
    next_edge: i64,
    vertices: BTreeMap<VertexId, Properties>,
    edges: BTreeMap<EdgeId, Edge>,
    type_index: BTreeMap<String, BTreeSet<VertexId>>,
    key_index_hidden: BTreeSet<VertexId>,
    unreadable: BTreeSet<VertexId>,
    failing_commits: u32,
}

impl MemoryState {
    fn unindex(&mut self, id: VertexId) {
        for members in self.type_index.values_mut() {
            members.remove(&id);
        }
        self.key_index_hidden.remove(&id);
    }

    fn remove_vertex(&mut self, id: VertexId) {
        self.vertices.remove(&id);
        self.unindex(id);
        self.edges.retain(|_, e| e.out_vertex != id && e.in_vertex != id);
    }

    fn set_properties(&mut self, id: VertexId, properties: Vec<(String, PropertyValue)>) {
        let Some(props) = self.vertices.get_mut(&id) else {
            return;
        };
        let mut retype = None;
        for (name, value) in properties {
            if name == NODE_TYPE {
                retype = value.as_str().map(str::to_string);
            }
            props.insert(name, value);
        }
        if let Some(node_type) = retype {
            self.unindex(id);
            self.type_index.entry(node_type).or_default().insert(id);
        }
    }

    fn key_matches(&self, id: VertexId, keys: &KeyValues) -> bool {
        if self.key_index_hidden.contains(&id) {
            return false;
        }
        let Some(props) = self.vertices.get(&id) else {
            return false;
        };
        keys.iter().all(|(k, v)| props.get(k) == Some(v))
    }

    fn query_by_keys(&self, node_type: &str, keys: &KeyValues) -> Vec<VertexId> {
        self.type_index
            .get(node_type)
            .map(|members| {
                members
                    .iter()
                    .copied()
                    .filter(|id| self.key_matches(*id, keys))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn incident(&self, id: VertexId, direction: Direction) -> Vec<Edge> {
        self.edges
            .values()
            .filter(|e| match direction {
                Direction::Out => e.out_vertex == id,
                Direction::In => e.in_vertex == id,
                Direction::Both => e.out_vertex == id || e.in_vertex == id,
            })
            .cloned()
            .collect()
    }
}

/// Shared in-memory graph. Clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A new handle with its own mutation buffer.
    pub fn handle(&self) -> MemoryGraph {
        MemoryGraph {
            store: self.clone(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// An independent deep copy of the current state.
    pub fn snapshot(&self) -> MemoryStore {
        let copy = self.state().clone();
        MemoryStore {
            state: Arc::new(Mutex::new(copy)),
        }
    }

    // ── Seeding ──────────────────────────────────────────────────

    /// Insert a vertex of `node_type` and index it consistently.
    pub fn add_vertex<'a>(
        &self,
        node_type: &str,
        properties: impl IntoIterator<Item = (&'a str, PropertyValue)>,
    ) -> VertexId {
        let mut props: Properties = properties
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        props.insert(NODE_TYPE.to_string(), PropertyValue::from(node_type));

        let mut state = self.state();
        state.next_vertex += 1;
        let id = VertexId(state.next_vertex);
        state.vertices.insert(id, props);
        state
            .type_index
            .entry(node_type.to_string())
            .or_default()
            .insert(id);
        id
    }

    /// Insert an edge. Endpoints are not checked, so dangling edges can be
    /// created deliberately.
    pub fn add_edge(
        &self,
        label: &str,
        out_vertex: VertexId,
        in_vertex: VertexId,
        contains_other_v: EdgeMarker,
    ) -> EdgeId {
        let mut state = self.state();
        state.next_edge += 1;
        let id = EdgeId(state.next_edge);
        state.edges.insert(
            id,
            Edge {
                id,
                label: label.to_string(),
                out_vertex,
                in_vertex,
                contains_other_v,
                delete_other_v: contains_other_v,
                properties: Properties::new(),
            },
        );
        id
    }

    /// Add a containment edge from `parent` down to `child`.
    pub fn contain(&self, parent: VertexId, child: VertexId) -> EdgeId {
        self.add_edge("tosca.relationships.HostedOn", parent, child, EdgeMarker::Out)
    }

    // ── Drift injection ──────────────────────────────────────────

    /// Drop a property from the vertex data while leaving every index as is.
    pub fn strip_property(&self, id: VertexId, name: &str) {
        if let Some(props) = self.state().vertices.get_mut(&id) {
            props.remove(name);
        }
    }

    /// Overwrite a property in the vertex data without reindexing.
    pub fn overwrite_property(&self, id: VertexId, name: &str, value: PropertyValue) {
        if let Some(props) = self.state().vertices.get_mut(&id) {
            props.insert(name.to_string(), value);
        }
    }

    /// Make the key index stop resolving this vertex.
    pub fn hide_from_key_index(&self, id: VertexId) {
        self.state().key_index_hidden.insert(id);
    }

    /// Remove vertex data and index entries but keep its edges.
    pub fn purge_vertex(&self, id: VertexId) {
        let mut state = self.state();
        state.vertices.remove(&id);
        state.unindex(id);
    }

    /// Make reads of this vertex fail.
    pub fn make_unreadable(&self, id: VertexId) {
        self.state().unreadable.insert(id);
    }

    /// Make the next `count` commits fail.
    pub fn fail_commits(&self, count: u32) {
        self.state().failing_commits = count;
    }

    // ── Inspection ───────────────────────────────────────────────

    pub fn contains_vertex(&self, id: VertexId) -> bool {
        self.state().vertices.contains_key(&id)
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.state().edges.contains_key(&id)
    }

    pub fn property(&self, id: VertexId, name: &str) -> Option<PropertyValue> {
        self.state().vertices.get(&id)?.get(name).cloned()
    }

    pub fn vertex_count(&self) -> usize {
        self.state().vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.state().edges.len()
    }
}

#[derive(Debug, Clone)]
enum PendingOp {
    DeleteVertex(VertexId),
    DeleteEdge(EdgeId),
    SetProperties(VertexId, Vec<(String, PropertyValue)>),
}

/// A handle onto a [`MemoryStore`] with its own mutation buffer.
#[derive(Debug)]
pub struct MemoryGraph {
    store: MemoryStore,
    pending: Mutex<Vec<PendingOp>>,
}

impl MemoryGraph {
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn pending(&self) -> MutexGuard<'_, Vec<PendingOp>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl GraphAccess for MemoryGraph {
    async fn vertex(&self, id: VertexId) -> Result<Option<Vertex>, GraphError> {
        let state = self.store.state();
        if state.unreadable.contains(&id) {
            return Err(GraphError::Query(format!("vertex {id} could not be read")));
        }
        Ok(state.vertices.get(&id).map(|props| Vertex {
            id,
            properties: props.clone(),
        }))
    }

    async fn vertex_ids_of_type(&self, node_type: &str) -> Result<Vec<VertexId>, GraphError> {
        let state = self.store.state();
        Ok(state
            .type_index
            .get(node_type)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn query_by_keys(
        &self,
        node_type: &str,
        keys: &KeyValues,
    ) -> Result<Vec<VertexId>, GraphError> {
        Ok(self.store.state().query_by_keys(node_type, keys))
    }

    async fn children_by_keys(
        &self,
        parent: VertexId,
        node_type: &str,
        keys: &KeyValues,
    ) -> Result<Vec<VertexId>, GraphError> {
        let state = self.store.state();
        let children: BTreeSet<VertexId> = state
            .incident(parent, Direction::Both)
            .iter()
            .filter_map(|e| e.child_of(parent))
            .collect();
        Ok(state
            .query_by_keys(node_type, keys)
            .into_iter()
            .filter(|id| children.contains(id))
            .collect())
    }

    async fn incident_edges(
        &self,
        id: VertexId,
        direction: Direction,
    ) -> Result<Vec<Edge>, GraphError> {
        Ok(self.store.state().incident(id, direction))
    }

    async fn neighbor_ids(&self, id: VertexId) -> Result<BTreeSet<VertexId>, GraphError> {
        Ok(self
            .store
            .state()
            .incident(id, Direction::Both)
            .iter()
            .filter_map(|e| e.other_end(id))
            .collect())
    }

    async fn edge_ids(&self) -> Result<Vec<EdgeId>, GraphError> {
        Ok(self.store.state().edges.keys().copied().collect())
    }

    async fn edge(&self, id: EdgeId) -> Result<Option<Edge>, GraphError> {
        Ok(self.store.state().edges.get(&id).cloned())
    }

    async fn delete_vertex(&self, id: VertexId) -> Result<(), GraphError> {
        self.pending().push(PendingOp::DeleteVertex(id));
        Ok(())
    }

    async fn delete_edge(&self, id: EdgeId) -> Result<(), GraphError> {
        self.pending().push(PendingOp::DeleteEdge(id));
        Ok(())
    }

    async fn set_properties(
        &self,
        id: VertexId,
        properties: Vec<(String, PropertyValue)>,
    ) -> Result<(), GraphError> {
        self.pending().push(PendingOp::SetProperties(id, properties));
        Ok(())
    }

    async fn commit(&self) -> Result<(), GraphError> {
        let ops = std::mem::take(&mut *self.pending());
        let mut state = self.store.state();
        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(GraphError::Transaction(format!(
                "commit of {} mutations rejected",
                ops.len()
            )));
        }
        for op in ops {
            match op {
                PendingOp::DeleteVertex(id) => state.remove_vertex(id),
                PendingOp::DeleteEdge(id) => {
                    state.edges.remove(&id);
                }
                PendingOp::SetProperties(id, props) => state.set_properties(id, props),
            }
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), GraphError> {
        self.pending().clear();
        Ok(())
    }

    async fn pending_mutations(&self) -> usize {
        self.pending().len()
    }
}

/// Hands out handles onto in-memory stores.
///
/// `Cached` handles read `cache`, `Fresh` handles read `store`. Both are the
/// same store unless built with [`MemoryProvider::with_stale_cache`], which
/// models a pooled connection whose view has fallen behind the store.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    cache: MemoryStore,
    store: MemoryStore,
}

impl MemoryProvider {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            cache: store.clone(),
            store,
        }
    }

    pub fn with_stale_cache(cache: MemoryStore, store: MemoryStore) -> Self {
        Self { cache, store }
    }
}

#[async_trait]
impl GraphProvider for MemoryProvider {
    type Handle = MemoryGraph;

    async fn open(&self, mode: ConnectionMode) -> Result<MemoryGraph, GraphError> {
        Ok(match mode {
            ConnectionMode::Cached => self.cache.handle(),
            ConnectionMode::Fresh => self.store.handle(),
        })
    }
}
