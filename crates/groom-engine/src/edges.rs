//! Dangling-edge detection.
//!
//! Each endpoint is resolved through the primary handle and, when a
//! verification handle is available, fetched again through it. The second
//! read is the ghost2 check: a vertex the fresh connection cannot see is a
//! confirmed ghost even if the primary view still serves it.

use groom_core::{Edge, GraphAccess, GraphError, TypeCatalog, VertexId};

/// Condition of an edge endpoint as seen by the primary handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointState {
    Healthy,
    Unfetchable,
    MissingDiscriminator,
    UnknownType(String),
    IncompleteKeys(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCheck {
    pub vertex: VertexId,
    pub primary: EndpointState,
    /// The primary handle fetched the vertex but the verification handle
    /// could not.
    pub ghost2: bool,
}

impl EndpointCheck {
    pub fn is_bad(&self) -> bool {
        self.primary != EndpointState::Healthy || self.ghost2
    }

    /// Only the ghost2 check objects; the primary view looks healthy.
    pub fn ghost2_only(&self) -> bool {
        self.ghost2 && self.primary == EndpointState::Healthy
    }
}

pub struct EdgeIntegrityChecker<'a, G: GraphAccess + ?Sized> {
    primary: &'a G,
    verifier: Option<&'a G>,
    catalog: &'a dyn TypeCatalog,
}

impl<'a, G: GraphAccess + ?Sized> EdgeIntegrityChecker<'a, G> {
    pub fn new(primary: &'a G, verifier: Option<&'a G>, catalog: &'a dyn TypeCatalog) -> Self {
        Self {
            primary,
            verifier,
            catalog,
        }
    }

    /// Bad endpoints of `edge`, out-vertex first. Empty when the edge is sound.
    pub async fn bad_endpoints(&self, edge: &Edge) -> Result<Vec<EndpointCheck>, GraphError> {
        let mut bad = Vec::new();
        let ends = if edge.out_vertex == edge.in_vertex {
            vec![edge.out_vertex]
        } else {
            vec![edge.out_vertex, edge.in_vertex]
        };
        for vertex in ends {
            let check = self.check_endpoint(vertex).await?;
            if check.is_bad() {
                tracing::debug!(edge = %edge.id, ?check, "Bad edge endpoint");
                bad.push(check);
            }
        }
        Ok(bad)
    }

    pub async fn check_endpoint(&self, id: VertexId) -> Result<EndpointCheck, GraphError> {
        let primary = match self.primary.vertex(id).await? {
            None => EndpointState::Unfetchable,
            Some(vertex) => match vertex.node_type() {
                None => EndpointState::MissingDiscriminator,
                Some(node_type) => match self.catalog.descriptor(node_type) {
                    None => EndpointState::UnknownType(node_type.to_string()),
                    Some(d) if vertex.key_values(&d.key_properties).is_none() => {
                        EndpointState::IncompleteKeys(node_type.to_string())
                    }
                    Some(_) => EndpointState::Healthy,
                },
            },
        };
        let ghost2 = match self.verifier {
            Some(verifier) if primary != EndpointState::Unfetchable => {
                verifier.vertex(id).await?.is_none()
            }
            _ => false,
        };
        Ok(EndpointCheck {
            vertex: id,
            primary,
            ghost2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groom_core::memory::MemoryStore;
    use groom_core::types::{EdgeMarker, NODE_TYPE};
    use groom_core::{PropertyValue, SchemaCatalog};

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_json(
            r#"{"node_types": [{"name": "pserver", "key_properties": ["hostname"]}]}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sound_edge_has_no_bad_endpoints() {
        let store = MemoryStore::new();
        let a = store.add_vertex("pserver", [("hostname", PropertyValue::from("a"))]);
        let b = store.add_vertex("pserver", [("hostname", PropertyValue::from("b"))]);
        let e = store.add_edge("peer", a, b, EdgeMarker::None);

        let catalog = catalog();
        let graph = store.handle();
        let checker = EdgeIntegrityChecker::new(&graph, None, &catalog);
        let edge = graph.edge(e).await.unwrap().unwrap();
        assert!(checker.bad_endpoints(&edge).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn endpoint_states() {
        let store = MemoryStore::new();
        let a = store.add_vertex("pserver", [("hostname", PropertyValue::from("a"))]);
        let untyped = store.add_vertex("pserver", [("hostname", PropertyValue::from("b"))]);
        store.strip_property(untyped, NODE_TYPE);
        let keyless = store.add_vertex("pserver", std::iter::empty());
        let foreign = store.add_vertex("vserver", [("vserver-id", PropertyValue::from("v"))]);

        let catalog = catalog();
        let graph = store.handle();
        let checker = EdgeIntegrityChecker::new(&graph, Some(&graph), &catalog);

        assert_eq!(
            checker.check_endpoint(a).await.unwrap().primary,
            EndpointState::Healthy
        );
        assert_eq!(
            checker.check_endpoint(untyped).await.unwrap().primary,
            EndpointState::MissingDiscriminator
        );
        assert_eq!(
            checker.check_endpoint(keyless).await.unwrap().primary,
            EndpointState::IncompleteKeys("pserver".into())
        );
        assert_eq!(
            checker.check_endpoint(foreign).await.unwrap().primary,
            EndpointState::UnknownType("vserver".into())
        );
        let missing = checker.check_endpoint(VertexId(999)).await.unwrap();
        assert_eq!(missing.primary, EndpointState::Unfetchable);
        assert!(!missing.ghost2);
    }

    #[tokio::test]
    async fn fresh_handle_exposes_stale_primary_view() {
        let store = MemoryStore::new();
        let a = store.add_vertex("pserver", [("hostname", PropertyValue::from("a"))]);
        let b = store.add_vertex("pserver", [("hostname", PropertyValue::from("b"))]);
        let e = store.add_edge("peer", a, b, EdgeMarker::None);
        let cache = store.snapshot();
        store.purge_vertex(b);

        let catalog = catalog();
        let primary = cache.handle();
        let verifier = store.handle();
        let checker = EdgeIntegrityChecker::new(&primary, Some(&verifier), &catalog);
        let edge = primary.edge(e).await.unwrap().unwrap();

        let bad = checker.bad_endpoints(&edge).await.unwrap();
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].vertex, b);
        assert!(bad[0].ghost2_only());
    }
}
