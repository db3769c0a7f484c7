//! The only path from the engine to a graph mutation.
//!
//! Every delete or index repair is checked against the candidate set first;
//! an id the previous report did not name is never touched. Accepted
//! mutations are queued on the handle, staged in the audit session, and
//! counted per batch. Counts only move into the run totals once the batch
//! commits.

use groom_audit::session::AuditSession;
use groom_audit::{HandleRole, MutationKind};
use groom_core::{EdgeId, ErrorCategory, GraphAccess, PropertyValue, VertexId};

use crate::candidates::CandidateSet;
use crate::report::RunReport;

#[derive(Debug, Clone, Copy, Default)]
struct Batch {
    deletes: u64,
    index_repairs: u64,
}

pub struct Mutator<'a, G: GraphAccess + ?Sized> {
    primary: &'a G,
    verifier: Option<&'a G>,
    candidates: CandidateSet,
    session: AuditSession,
    primary_batch: Batch,
    verifier_batch: Batch,
}

impl<'a, G: GraphAccess + ?Sized> Mutator<'a, G> {
    pub fn new(
        primary: &'a G,
        verifier: Option<&'a G>,
        candidates: CandidateSet,
        session: AuditSession,
    ) -> Self {
        Self {
            primary,
            verifier,
            candidates,
            session,
            primary_batch: Batch::default(),
            verifier_batch: Batch::default(),
        }
    }

    pub fn authorizes_vertex(&self, id: VertexId) -> bool {
        self.candidates.contains_vertex(id)
    }

    pub fn authorizes_edge(&self, id: EdgeId) -> bool {
        self.candidates.contains_edge(id)
    }

    fn handle(&self, role: HandleRole) -> Option<&'a G> {
        match role {
            HandleRole::Primary => Some(self.primary),
            HandleRole::Verification => self.verifier,
        }
    }

    fn batch(&mut self, role: HandleRole) -> &mut Batch {
        match role {
            HandleRole::Primary => &mut self.primary_batch,
            HandleRole::Verification => &mut self.verifier_batch,
        }
    }

    /// Queue deletion of `id` through `role`'s handle. Returns whether the
    /// delete was queued.
    pub async fn delete_vertex(
        &mut self,
        id: VertexId,
        category: &str,
        role: HandleRole,
        report: &mut RunReport,
    ) -> bool {
        if !self.authorizes_vertex(id) {
            return false;
        }
        let Some(handle) = self.handle(role) else {
            return false;
        };
        if let Err(e) = handle.delete_vertex(id).await {
            report.record_error(ErrorCategory::Data, format!("vertex {id}"), e.to_string());
            return false;
        }
        tracing::info!(vertex = %id, category, handle = ?role, "Vertex delete queued");
        self.session
            .stage(MutationKind::DeleteVertex, id.0, category, role);
        self.batch(role).deletes += 1;
        true
    }

    pub async fn delete_edge(&mut self, id: EdgeId, category: &str, report: &mut RunReport) -> bool {
        if !self.authorizes_edge(id) {
            return false;
        }
        if let Err(e) = self.primary.delete_edge(id).await {
            report.record_error(ErrorCategory::Data, format!("edge {id}"), e.to_string());
            return false;
        }
        tracing::info!(edge = %id, category, "Edge delete queued");
        self.session
            .stage(MutationKind::DeleteEdge, id.0, category, HandleRole::Primary);
        self.primary_batch.deletes += 1;
        true
    }

    /// Queue an index-only repair overwriting `properties` on `id`.
    pub async fn repair_index(
        &mut self,
        id: VertexId,
        properties: Vec<(String, PropertyValue)>,
        category: &str,
        report: &mut RunReport,
    ) -> bool {
        if !self.authorizes_vertex(id) {
            return false;
        }
        if let Err(e) = self.primary.set_properties(id, properties).await {
            report.record_error(ErrorCategory::Data, format!("vertex {id}"), e.to_string());
            return false;
        }
        tracing::info!(vertex = %id, category, "Index repair queued");
        self.session
            .stage(MutationKind::IndexRepair, id.0, category, HandleRole::Primary);
        self.primary_batch.index_repairs += 1;
        true
    }

    /// Commit (or, when nothing is queued, roll back) each handle. A failed
    /// commit loses that batch: its counts are dropped and its audit entries
    /// are marked uncommitted.
    pub async fn flush(&mut self, report: &mut RunReport) {
        for role in [HandleRole::Primary, HandleRole::Verification] {
            let Some(handle) = self.handle(role) else {
                continue;
            };
            let batch = std::mem::take(self.batch(role));

            if handle.pending_mutations().await == 0 {
                if let Err(e) = handle.rollback().await {
                    tracing::warn!(handle = ?role, error = %e, "Rollback failed");
                }
                self.session.settle_handle(role, false);
                continue;
            }

            match handle.commit().await {
                Ok(()) => {
                    report.counters.deletes += batch.deletes;
                    report.counters.index_repairs += batch.index_repairs;
                    self.session.settle_handle(role, true);
                    tracing::info!(
                        handle = ?role,
                        deletes = batch.deletes,
                        index_repairs = batch.index_repairs,
                        "Batch committed"
                    );
                }
                Err(e) => {
                    tracing::error!(handle = ?role, error = %e, "Commit failed; batch dropped");
                    if let Err(e) = handle.rollback().await {
                        tracing::warn!(handle = ?role, error = %e, "Rollback failed");
                    }
                    self.session.settle_handle(role, false);
                    report.record_error(
                        ErrorCategory::Data,
                        format!("{role:?} commit").to_lowercase(),
                        e.to_string(),
                    );
                }
            }
        }
    }

    /// Discard everything queued, e.g. after a timeout.
    pub async fn abandon(&mut self) {
        for role in [HandleRole::Primary, HandleRole::Verification] {
            if let Some(handle) = self.handle(role) {
                if let Err(e) = handle.rollback().await {
                    tracing::warn!(handle = ?role, error = %e, "Rollback failed");
                }
            }
            *self.batch(role) = Batch::default();
            self.session.settle_handle(role, false);
        }
    }

    /// Hand back the audit session once the run is over.
    pub fn into_session(self) -> AuditSession {
        self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::CandidateFilter;
    use groom_audit::RunMode;
    use groom_core::memory::MemoryStore;

    fn setup(candidates: &str) -> (MemoryStore, CandidateSet, RunReport, AuditSession) {
        let set = CandidateSet::parse(candidates, CandidateFilter::default()).unwrap();
        let session = AuditSession::new(RunMode::Fix, serde_json::Value::Null);
        let report = RunReport::new(session.id(), RunMode::Fix, Vec::new());
        (MemoryStore::new(), set, report, session)
    }

    #[tokio::test]
    async fn refuses_ids_outside_the_candidate_set() {
        let (store, set, mut report, session) = setup("DeleteCandidate: Phantom Vid = [1]\n");
        let a = store.add_vertex("pserver", [("hostname", PropertyValue::from("a"))]);
        let b = store.add_vertex("pserver", [("hostname", PropertyValue::from("b"))]);
        let graph = store.handle();
        let mut mutator = Mutator::new(&graph, None, set, session);

        assert!(mutator.delete_vertex(a, "Phantom", HandleRole::Primary, &mut report).await);
        assert!(!mutator.delete_vertex(b, "Phantom", HandleRole::Primary, &mut report).await);
        mutator.flush(&mut report).await;

        assert!(!store.contains_vertex(a));
        assert!(store.contains_vertex(b));
        assert_eq!(report.counters.deletes, 1);
        let record = mutator.into_session().finalize();
        assert_eq!(record.committed_mutations().count(), 1);
    }

    #[tokio::test]
    async fn failed_commit_drops_the_batch() {
        let (store, set, mut report, session) = setup("DeleteCandidate: Phantom Vid = [1]\n");
        let a = store.add_vertex("pserver", [("hostname", PropertyValue::from("a"))]);
        store.fail_commits(1);
        let graph = store.handle();
        let mut mutator = Mutator::new(&graph, None, set, session);

        mutator.delete_vertex(a, "Phantom", HandleRole::Primary, &mut report).await;
        mutator.flush(&mut report).await;

        assert!(store.contains_vertex(a));
        assert_eq!(report.counters.deletes, 0);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].category, ErrorCategory::Data);
        let record = mutator.into_session().finalize();
        assert_eq!(record.mutations.len(), 1);
        assert!(!record.mutations[0].committed);
    }
}
