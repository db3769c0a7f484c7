//! Keeper selection for groups of vertices that claim the same identity.
//!
//! Members are reduced pairwise, left to right: the current favourite is
//! compared against each following member and the winner carries on. One
//! undecided comparison leaves the whole group undetermined.
//!
//! A comparison first gathers evidence (neighbour sets and, for top-level
//! types, which vertex the key index resolves), then asks an ordered chain of
//! strategies for a verdict. The first strategy that keeps a vertex or
//! abstains ends the chain.

use std::collections::BTreeSet;

use groom_core::{GraphAccess, GraphError, NodeTypeDescriptor, Vertex, VertexId};

use crate::classifier::containment_parents;
use crate::report::Keeper;

/// What a comparison knows about a pair of same-identity vertices.
#[derive(Debug, Clone)]
pub struct PairEvidence {
    pub a: VertexId,
    pub b: VertexId,
    pub neighbors_a: BTreeSet<VertexId>,
    pub neighbors_b: BTreeSet<VertexId>,
    /// The one vertex of the pair a key-only lookup resolves, if exactly one.
    pub index_anchor: Option<VertexId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep(VertexId),
    /// No opinion; ask the next strategy.
    Pass,
    /// Conflicting evidence; no keeper for this pair.
    Abstain,
}

pub trait KeeperStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn decide(&self, evidence: &PairEvidence) -> Verdict;
}

/// Prefer the vertex whose neighbours strictly include the other's.
pub struct Connectivity;

impl KeeperStrategy for Connectivity {
    fn name(&self) -> &'static str {
        "connectivity"
    }

    fn decide(&self, e: &PairEvidence) -> Verdict {
        let (a_covers, b_covers) = (
            e.neighbors_a.is_superset(&e.neighbors_b),
            e.neighbors_b.is_superset(&e.neighbors_a),
        );
        let favoured = match (a_covers, b_covers) {
            (true, true) => return Verdict::Pass,
            (true, false) => e.a,
            (false, true) => e.b,
            (false, false) => return Verdict::Abstain,
        };
        // Index resolves the other vertex: evidence conflicts.
        match e.index_anchor {
            Some(anchor) if anchor != favoured => Verdict::Abstain,
            _ => Verdict::Keep(favoured),
        }
    }
}

/// Prefer the vertex the key index resolves.
pub struct IndexAnchor;

impl KeeperStrategy for IndexAnchor {
    fn name(&self) -> &'static str {
        "index-anchor"
    }

    fn decide(&self, e: &PairEvidence) -> Verdict {
        e.index_anchor.map_or(Verdict::Pass, Verdict::Keep)
    }
}

/// Prefer the lower vertex id.
pub struct LowestId;

impl KeeperStrategy for LowestId {
    fn name(&self) -> &'static str {
        "lowest-id"
    }

    fn decide(&self, e: &PairEvidence) -> Verdict {
        Verdict::Keep(e.a.min(e.b))
    }
}

pub fn default_strategies() -> Vec<Box<dyn KeeperStrategy>> {
    vec![Box::new(Connectivity), Box::new(IndexAnchor), Box::new(LowestId)]
}

/// Run the chain. Exhausting it without a decision counts as abstaining.
pub fn decide(strategies: &[Box<dyn KeeperStrategy>], evidence: &PairEvidence) -> Verdict {
    for strategy in strategies {
        match strategy.decide(evidence) {
            Verdict::Pass => continue,
            verdict => {
                tracing::debug!(
                    strategy = strategy.name(),
                    a = %evidence.a,
                    b = %evidence.b,
                    ?verdict,
                    "Keeper comparison decided"
                );
                return verdict;
            }
        }
    }
    Verdict::Abstain
}

pub struct DuplicateResolver<'a, G: GraphAccess + ?Sized> {
    graph: &'a G,
    strategies: Vec<Box<dyn KeeperStrategy>>,
}

impl<'a, G: GraphAccess + ?Sized> DuplicateResolver<'a, G> {
    pub fn new(graph: &'a G) -> Self {
        Self::with_strategies(graph, default_strategies())
    }

    pub fn with_strategies(graph: &'a G, strategies: Vec<Box<dyn KeeperStrategy>>) -> Self {
        Self { graph, strategies }
    }

    /// Pick the keeper of `members` (at least two, all filed under
    /// `descriptor`'s type).
    pub async fn resolve(
        &self,
        descriptor: &NodeTypeDescriptor,
        members: &[VertexId],
    ) -> Result<Keeper, GraphError> {
        let Some((&first, rest)) = members.split_first() else {
            return Ok(Keeper::Undetermined);
        };
        let mut favourite = first;
        for &challenger in rest {
            match self.compare(descriptor, favourite, challenger).await? {
                Some(winner) => favourite = winner,
                None => return Ok(Keeper::Undetermined),
            }
        }
        Ok(Keeper::Determined(favourite))
    }

    /// The preferred vertex of the pair, or `None` when undecidable.
    pub async fn compare(
        &self,
        descriptor: &NodeTypeDescriptor,
        a: VertexId,
        b: VertexId,
    ) -> Result<Option<VertexId>, GraphError> {
        let (Some(va), Some(vb)) = (self.graph.vertex(a).await?, self.graph.vertex(b).await?)
        else {
            return Ok(None);
        };
        let Some(keys) = comparable_keys(&va, &vb, descriptor) else {
            return Ok(None);
        };

        let index_anchor = if descriptor.is_top_level() {
            let found = self.graph.query_by_keys(&descriptor.name, &keys).await?;
            match (found.contains(&a), found.contains(&b)) {
                (true, false) => Some(a),
                (false, true) => Some(b),
                _ => None,
            }
        } else {
            let pa = containment_parents(self.graph, a, &descriptor.dependent_on).await?;
            let pb = containment_parents(self.graph, b, &descriptor.dependent_on).await?;
            if pa.len() != 1 || pa != pb {
                return Ok(None);
            }
            None
        };

        let evidence = PairEvidence {
            a,
            b,
            neighbors_a: self.graph.neighbor_ids(a).await?,
            neighbors_b: self.graph.neighbor_ids(b).await?,
            index_anchor,
        };
        Ok(match decide(&self.strategies, &evidence) {
            Verdict::Keep(winner) => Some(winner),
            Verdict::Pass | Verdict::Abstain => None,
        })
    }
}

/// Shared key values of two vertices with the same, present discriminator.
fn comparable_keys(
    a: &Vertex,
    b: &Vertex,
    descriptor: &NodeTypeDescriptor,
) -> Option<Vec<(String, groom_core::PropertyValue)>> {
    let (ta, tb) = (a.node_type()?, b.node_type()?);
    if ta != tb {
        return None;
    }
    let ka = a.key_values(&descriptor.key_properties)?;
    let kb = b.key_values(&descriptor.key_properties)?;
    (ka == kb).then_some(ka)
}

#[cfg(test)]
mod tests {
    use super::*;
    use groom_core::memory::MemoryStore;
    use groom_core::types::EdgeMarker;
    use groom_core::{PropertyValue, SchemaCatalog, TypeCatalog};

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_json(
            r#"{"node_types": [
                {"name": "pserver", "key_properties": ["hostname"]},
                {"name": "complex", "key_properties": ["clli"]},
                {"name": "p-interface", "key_properties": ["interface-name"],
                 "dependent_on": ["pserver"]}
            ]}"#,
        )
        .unwrap()
    }

    fn evidence(a: &[i64], b: &[i64], anchor: Option<i64>) -> PairEvidence {
        PairEvidence {
            a: VertexId(1),
            b: VertexId(2),
            neighbors_a: a.iter().map(|&i| VertexId(i)).collect(),
            neighbors_b: b.iter().map(|&i| VertexId(i)).collect(),
            index_anchor: anchor.map(VertexId),
        }
    }

    #[test]
    fn strategy_chain_verdicts() {
        let chain = default_strategies();
        // Superset wins.
        assert_eq!(decide(&chain, &evidence(&[10, 11], &[10], None)), Verdict::Keep(VertexId(1)));
        assert_eq!(decide(&chain, &evidence(&[10], &[10, 11], None)), Verdict::Keep(VertexId(2)));
        // Equal neighbours: anchor, then lowest id.
        assert_eq!(decide(&chain, &evidence(&[10], &[10], Some(2))), Verdict::Keep(VertexId(2)));
        assert_eq!(decide(&chain, &evidence(&[10], &[10], None)), Verdict::Keep(VertexId(1)));
        // Divergent neighbours.
        assert_eq!(decide(&chain, &evidence(&[10], &[11], None)), Verdict::Abstain);
        // Connectivity and index disagree.
        assert_eq!(decide(&chain, &evidence(&[10, 11], &[10], Some(2))), Verdict::Abstain);
    }

    fn server(store: &MemoryStore, name: &str) -> VertexId {
        store.add_vertex("pserver", [("hostname", PropertyValue::from(name))])
    }

    #[tokio::test]
    async fn better_connected_duplicate_is_kept() {
        let store = MemoryStore::new();
        let catalog = catalog();
        let a = server(&store, "dup");
        let b = server(&store, "dup");
        let x = store.add_vertex("complex", [("clli", PropertyValue::from("x"))]);
        let y = store.add_vertex("complex", [("clli", PropertyValue::from("y"))]);
        store.add_edge("locatedIn", a, x, EdgeMarker::None);
        store.add_edge("locatedIn", a, y, EdgeMarker::None);
        store.add_edge("locatedIn", b, x, EdgeMarker::None);

        let graph = store.handle();
        let resolver = DuplicateResolver::new(&graph);
        let keeper = resolver
            .resolve(catalog.descriptor("pserver").unwrap(), &[a, b])
            .await
            .unwrap();
        assert_eq!(keeper, Keeper::Determined(a));
    }

    #[tokio::test]
    async fn identical_neighbourhoods_fall_back_to_lowest_id() {
        let store = MemoryStore::new();
        let catalog = catalog();
        let a = server(&store, "dup");
        let b = server(&store, "dup");
        let c = server(&store, "dup");

        let graph = store.handle();
        let keeper = DuplicateResolver::new(&graph)
            .resolve(catalog.descriptor("pserver").unwrap(), &[c, b, a])
            .await
            .unwrap();
        assert_eq!(keeper, Keeper::Determined(a));
    }

    #[tokio::test]
    async fn index_anchor_breaks_a_connectivity_tie() {
        let store = MemoryStore::new();
        let catalog = catalog();
        let a = server(&store, "dup");
        let b = server(&store, "dup");
        store.hide_from_key_index(a);

        let graph = store.handle();
        let keeper = DuplicateResolver::new(&graph)
            .resolve(catalog.descriptor("pserver").unwrap(), &[a, b])
            .await
            .unwrap();
        assert_eq!(keeper, Keeper::Determined(b));
    }

    #[tokio::test]
    async fn divergent_neighbourhoods_are_undetermined() {
        let store = MemoryStore::new();
        let catalog = catalog();
        let a = server(&store, "dup");
        let b = server(&store, "dup");
        let x = store.add_vertex("complex", [("clli", PropertyValue::from("x"))]);
        let y = store.add_vertex("complex", [("clli", PropertyValue::from("y"))]);
        store.add_edge("locatedIn", a, x, EdgeMarker::None);
        store.add_edge("locatedIn", b, y, EdgeMarker::None);

        let graph = store.handle();
        let keeper = DuplicateResolver::new(&graph)
            .resolve(catalog.descriptor("pserver").unwrap(), &[a, b])
            .await
            .unwrap();
        assert_eq!(keeper, Keeper::Undetermined);
    }

    #[tokio::test]
    async fn dependent_duplicates_need_a_shared_parent() {
        let store = MemoryStore::new();
        let catalog = catalog();
        let h1 = server(&store, "h1");
        let h2 = server(&store, "h2");
        let p1 = store.add_vertex("p-interface", [("interface-name", PropertyValue::from("eth0"))]);
        let p2 = store.add_vertex("p-interface", [("interface-name", PropertyValue::from("eth0"))]);
        store.contain(h1, p1);
        store.contain(h2, p2);

        let graph = store.handle();
        let descriptor = catalog.descriptor("p-interface").unwrap();
        let resolver = DuplicateResolver::new(&graph);
        assert_eq!(resolver.compare(descriptor, p1, p2).await.unwrap(), None);

        let p3 = store.add_vertex("p-interface", [("interface-name", PropertyValue::from("eth0"))]);
        store.contain(h1, p3);
        assert_eq!(resolver.compare(descriptor, p1, p3).await.unwrap(), Some(p1));
    }
}
