//! Per-vertex classification: healthy, ghost, orphan, missing
//! discriminator, or part of a duplicate group.
//!
//! A vertex is judged against the node type the store's index filed it
//! under, which may disagree with (or survive the loss of) the vertex's own
//! discriminator.

use std::collections::BTreeSet;

use groom_core::types::Direction;
use groom_core::{GraphAccess, GraphError, NodeTypeDescriptor, Vertex, VertexId};

use crate::report::GhostSource;

/// Where a set of colliding vertices was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    TopLevel,
    Parent(VertexId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Healthy,
    Ghost(GhostSource),
    Orphan,
    MissingDiscriminator,
    /// The vertex collides with others on its key. Members include the
    /// vertex itself, in ascending id order.
    Duplicates { members: Vec<VertexId>, scope: Scope },
    /// More than one containment parent; left alone.
    Inconclusive { parents: usize },
}

pub struct Classifier<'a, G: GraphAccess + ?Sized> {
    graph: &'a G,
}

impl<'a, G: GraphAccess + ?Sized> Classifier<'a, G> {
    pub fn new(graph: &'a G) -> Self {
        Self { graph }
    }

    pub async fn classify(
        &self,
        vertex: &Vertex,
        descriptor: &NodeTypeDescriptor,
    ) -> Result<Classification, GraphError> {
        if vertex.node_type().is_none() {
            return Ok(Classification::MissingDiscriminator);
        }
        if descriptor.is_top_level() {
            self.classify_top_level(vertex, descriptor).await
        } else {
            self.classify_dependent(vertex, descriptor).await
        }
    }

    async fn classify_top_level(
        &self,
        vertex: &Vertex,
        descriptor: &NodeTypeDescriptor,
    ) -> Result<Classification, GraphError> {
        let Some(keys) = vertex.key_values(&descriptor.key_properties) else {
            return Ok(Classification::Ghost(GhostSource::KeyLookup));
        };
        let found = self.graph.query_by_keys(&descriptor.name, &keys).await?;
        Ok(judge_lookup(
            vertex.id,
            found,
            GhostSource::KeyLookup,
            Scope::TopLevel,
        ))
    }

    async fn classify_dependent(
        &self,
        vertex: &Vertex,
        descriptor: &NodeTypeDescriptor,
    ) -> Result<Classification, GraphError> {
        let parents = containment_parents(self.graph, vertex.id, &descriptor.dependent_on).await?;
        match parents.as_slice() {
            [] if vertex.has_dummy_marker() => Ok(Classification::MissingDiscriminator),
            [] => Ok(Classification::Orphan),
            [parent] => {
                let Some(keys) = vertex.key_values(&descriptor.key_properties) else {
                    return Ok(Classification::Ghost(GhostSource::ParentScope));
                };
                let found = self
                    .graph
                    .children_by_keys(*parent, &descriptor.name, &keys)
                    .await?;
                Ok(judge_lookup(
                    vertex.id,
                    found,
                    GhostSource::ParentScope,
                    Scope::Parent(*parent),
                ))
            }
            many => {
                tracing::debug!(vertex = %vertex.id, parents = many.len(), "Multiple containment parents");
                Ok(Classification::Inconclusive {
                    parents: many.len(),
                })
            }
        }
    }
}

/// Interpret a key lookup made on behalf of `id`.
fn judge_lookup(
    id: VertexId,
    found: Vec<VertexId>,
    source: GhostSource,
    scope: Scope,
) -> Classification {
    if found.is_empty() {
        return Classification::Ghost(source);
    }
    if found == [id] {
        return Classification::Healthy;
    }
    let mut members: BTreeSet<VertexId> = found.into_iter().collect();
    members.insert(id);
    Classification::Duplicates {
        members: members.into_iter().collect(),
        scope,
    }
}

/// Containment parents of `id` whose node type is one of `allowed`,
/// following containment-marked edges in both directions.
pub async fn containment_parents<G: GraphAccess + ?Sized>(
    graph: &G,
    id: VertexId,
    allowed: &BTreeSet<String>,
) -> Result<Vec<VertexId>, GraphError> {
    let candidates: BTreeSet<VertexId> = graph
        .incident_edges(id, Direction::Both)
        .await?
        .iter()
        .filter_map(|e| e.parent_of(id))
        .collect();

    let mut parents = Vec::new();
    for candidate in candidates {
        let Some(parent) = graph.vertex(candidate).await? else {
            continue;
        };
        if parent.node_type().is_some_and(|t| allowed.contains(t)) {
            parents.push(candidate);
        }
    }
    Ok(parents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use groom_core::memory::MemoryStore;
    use groom_core::types::{dummy_marker, NODE_TYPE, UNIQUE_KEY};
    use groom_core::{PropertyValue, SchemaCatalog, TypeCatalog};

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_json(
            r#"{"node_types": [
                {"name": "pserver", "key_properties": ["hostname"]},
                {"name": "p-interface", "key_properties": ["interface-name"],
                 "dependent_on": ["pserver"]}
            ]}"#,
        )
        .unwrap()
    }

    fn host(store: &MemoryStore, name: &str) -> VertexId {
        store.add_vertex("pserver", [("hostname", PropertyValue::from(name))])
    }

    fn port(store: &MemoryStore, name: &str) -> VertexId {
        store.add_vertex(
            "p-interface",
            [("interface-name", PropertyValue::from(name))],
        )
    }

    async fn classify(store: &MemoryStore, id: VertexId, node_type: &str) -> Classification {
        let catalog = catalog();
        let graph = store.handle();
        let vertex = graph.vertex(id).await.unwrap().unwrap();
        Classifier::new(&graph)
            .classify(&vertex, catalog.descriptor(node_type).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn healthy_top_level_vertex() {
        let store = MemoryStore::new();
        let a = host(&store, "a");
        assert_eq!(classify(&store, a, "pserver").await, Classification::Healthy);
    }

    #[tokio::test]
    async fn key_lookup_miss_is_ghost() {
        let store = MemoryStore::new();
        let a = host(&store, "a");
        store.hide_from_key_index(a);
        assert_eq!(
            classify(&store, a, "pserver").await,
            Classification::Ghost(GhostSource::KeyLookup)
        );
    }

    #[tokio::test]
    async fn key_collision_defers_to_duplicates() {
        let store = MemoryStore::new();
        let a = host(&store, "a");
        let b = host(&store, "a");
        assert_eq!(
            classify(&store, b, "pserver").await,
            Classification::Duplicates {
                members: vec![a, b],
                scope: Scope::TopLevel,
            }
        );
    }

    #[tokio::test]
    async fn orphan_versus_missing_discriminator() {
        let store = MemoryStore::new();
        let orphan = port(&store, "eth0");
        assert_eq!(
            classify(&store, orphan, "p-interface").await,
            Classification::Orphan
        );

        let untyped = port(&store, "eth1");
        store.strip_property(untyped, NODE_TYPE);
        assert_eq!(
            classify(&store, untyped, "p-interface").await,
            Classification::MissingDiscriminator
        );

        let stamped = port(&store, "eth2");
        store.overwrite_property(
            stamped,
            UNIQUE_KEY,
            PropertyValue::String(dummy_marker(stamped)),
        );
        assert_eq!(
            classify(&store, stamped, "p-interface").await,
            Classification::MissingDiscriminator
        );
    }

    #[tokio::test]
    async fn dependent_vertex_resolves_through_its_parent() {
        let store = MemoryStore::new();
        let h = host(&store, "h");
        let p = port(&store, "eth0");
        store.contain(h, p);
        assert_eq!(
            classify(&store, p, "p-interface").await,
            Classification::Healthy
        );

        store.hide_from_key_index(p);
        assert_eq!(
            classify(&store, p, "p-interface").await,
            Classification::Ghost(GhostSource::ParentScope)
        );
    }

    #[tokio::test]
    async fn same_key_under_different_parents_is_not_a_collision() {
        let store = MemoryStore::new();
        let h1 = host(&store, "h1");
        let h2 = host(&store, "h2");
        let p1 = port(&store, "eth0");
        let p2 = port(&store, "eth0");
        store.contain(h1, p1);
        store.contain(h2, p2);
        assert_eq!(
            classify(&store, p1, "p-interface").await,
            Classification::Healthy
        );

        let p3 = port(&store, "eth0");
        store.contain(h1, p3);
        assert_eq!(
            classify(&store, p3, "p-interface").await,
            Classification::Duplicates {
                members: vec![p1, p3],
                scope: Scope::Parent(h1),
            }
        );
    }

    #[tokio::test]
    async fn two_parents_are_inconclusive() {
        let store = MemoryStore::new();
        let h1 = host(&store, "h1");
        let h2 = host(&store, "h2");
        let p = port(&store, "eth0");
        store.contain(h1, p);
        store.contain(h2, p);
        assert_eq!(
            classify(&store, p, "p-interface").await,
            Classification::Inconclusive { parents: 2 }
        );
    }
}
