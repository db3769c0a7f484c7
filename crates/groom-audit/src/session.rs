//! Incremental recorder for a run's audit record.
//!
//! ```no_run
//! # use groom_audit::session::AuditSession;
//! # use groom_audit::{HandleRole, MutationKind, RunMode, RunSummary};
//! let mut session = AuditSession::new(RunMode::Fix, serde_json::json!({"max_fix": 10}));
//! session.set_candidates(3, false);
//! session.stage(MutationKind::DeleteVertex, 42, "Phantom", HandleRole::Primary);
//! session.settle_batch(true);
//! session.set_summary(RunSummary::default());
//! let record = session.finalize();
//! assert!(record.content_hash.is_some());
//! ```

use chrono::Utc;

use crate::{AuditRecord, HandleRole, MutationEntry, MutationKind, RunId, RunMode, RunSummary};

/// Records a run as it progresses.
///
/// Mutations are first staged; [`AuditSession::settle_batch`] moves every
/// staged entry into the record, stamped with whether its transaction
/// committed.
pub struct AuditSession {
    record: AuditRecord,
    staged: Vec<MutationEntry>,
}

impl AuditSession {
    pub fn new(mode: RunMode, options: serde_json::Value) -> Self {
        Self {
            record: AuditRecord {
                id: RunId::new(),
                mode,
                options,
                candidates_loaded: 0,
                candidates_discarded: false,
                mutations: Vec::new(),
                summary: None,
                report_path: None,
                failure: None,
                started_at: Utc::now(),
                completed_at: None,
                content_hash: None,
            },
            staged: Vec::new(),
        }
    }

    pub fn id(&self) -> RunId {
        self.record.id
    }

    pub fn mode(&self) -> RunMode {
        self.record.mode
    }

    /// Downgrade to report-only, e.g. after the candidate set was discarded.
    pub fn set_mode(&mut self, mode: RunMode) {
        self.record.mode = mode;
    }

    pub fn set_candidates(&mut self, loaded: usize, discarded: bool) {
        self.record.candidates_loaded = loaded as u64;
        self.record.candidates_discarded = discarded;
    }

    /// Stage a mutation queued on a handle but not yet committed.
    pub fn stage(&mut self, kind: MutationKind, element: i64, category: &str, handle: HandleRole) {
        self.staged.push(MutationEntry {
            kind,
            element,
            category: category.to_string(),
            handle,
            committed: false,
            timestamp: Utc::now(),
        });
    }

    /// Number of staged mutations carried by `handle`.
    pub fn staged_on(&self, handle: HandleRole) -> usize {
        self.staged.iter().filter(|m| m.handle == handle).count()
    }

    /// Move staged entries into the record with the transaction outcome.
    pub fn settle_batch(&mut self, committed: bool) {
        self.settle(committed, |_| true);
    }

    /// Like [`AuditSession::settle_batch`] but only for one handle's entries.
    pub fn settle_handle(&mut self, handle: HandleRole, committed: bool) {
        self.settle(committed, |m| m.handle == handle);
    }

    fn settle(&mut self, committed: bool, select: impl Fn(&MutationEntry) -> bool) {
        let (settled, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.staged).into_iter().partition(|m| select(m));
        self.staged = kept;
        self.record
            .mutations
            .extend(settled.into_iter().map(|m| MutationEntry { committed, ..m }));
    }

    pub fn set_summary(&mut self, summary: RunSummary) {
        self.record.summary = Some(summary);
    }

    pub fn set_report_path(&mut self, path: &str) {
        self.record.report_path = Some(path.to_string());
    }

    pub fn record_failure(&mut self, error: &str) {
        self.record.failure = Some(error.to_string());
    }

    /// Entries recorded so far (settled only).
    pub fn mutations(&self) -> &[MutationEntry] {
        &self.record.mutations
    }

    /// Seal the record. Entries still staged were never committed.
    pub fn finalize(mut self) -> AuditRecord {
        self.settle_batch(false);
        self.record.completed_at = Some(Utc::now());
        let hash = self.record.compute_hash();
        self.record.content_hash = Some(hash);
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_batches_carry_commit_outcome() {
        let mut session = AuditSession::new(RunMode::Fix, serde_json::Value::Null);
        session.stage(MutationKind::DeleteVertex, 1, "Phantom", HandleRole::Primary);
        session.settle_batch(true);
        session.stage(MutationKind::DeleteEdge, 2, "Bad EDGE", HandleRole::Primary);
        session.settle_batch(false);

        let record = session.finalize();
        assert_eq!(record.mutations.len(), 2);
        assert!(record.mutations[0].committed);
        assert!(!record.mutations[1].committed);
        assert_eq!(record.committed_mutations().count(), 1);
    }

    #[test]
    fn settle_handle_leaves_other_handles_staged() {
        let mut session = AuditSession::new(RunMode::Fix, serde_json::Value::Null);
        session.stage(MutationKind::DeleteVertex, 1, "Phantom", HandleRole::Primary);
        session.stage(MutationKind::DeleteVertex, 2, "Phantom", HandleRole::Verification);

        session.settle_handle(HandleRole::Verification, true);
        assert_eq!(session.staged_on(HandleRole::Primary), 1);
        assert_eq!(session.staged_on(HandleRole::Verification), 0);
        assert_eq!(session.mutations().len(), 1);
        assert_eq!(session.mutations()[0].element, 2);
    }

    #[test]
    fn finalize_marks_leftovers_uncommitted_and_seals() {
        let mut session = AuditSession::new(RunMode::Fix, serde_json::Value::Null);
        session.stage(MutationKind::IndexRepair, 9, "Missing aai-node-type", HandleRole::Primary);

        let record = session.finalize();
        assert!(!record.mutations[0].committed);
        assert!(record.completed_at.is_some());
        assert!(record.verify_integrity());
    }

    #[test]
    fn tampering_breaks_integrity() {
        let session = AuditSession::new(RunMode::ReportOnly, serde_json::Value::Null);
        let mut record = session.finalize();
        record.mode = RunMode::Fix;
        assert!(!record.verify_integrity());
    }
}
