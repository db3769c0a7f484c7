//! Audit session helpers for grooming runs.

use std::path::Path;

use groom_audit::session::AuditSession;
use groom_audit::store::{AuditStore, FsAuditStore};
use groom_audit::{AuditRecord, RunMode};

use crate::options::GroomOptions;
use crate::report::RunReport;

/// Start the audit session for a run.
pub fn start_run_session(mode: RunMode, options: &GroomOptions) -> AuditSession {
    let snapshot = serde_json::to_value(options).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not snapshot run options");
        serde_json::Value::Null
    });
    AuditSession::new(mode, snapshot)
}

/// Copy the run's outcome into the session.
pub fn record_run_results(session: &mut AuditSession, report: &RunReport, report_path: &Path) {
    session.set_summary(report.summary());
    session.set_report_path(&report_path.display().to_string());
    if let Some(reason) = &report.aborted {
        session.record_failure(reason);
    }
}

/// Finalize the session and store the record. Storage problems are logged
/// and never fail the run.
pub fn finalize_and_store(session: AuditSession, audit_dir: Option<&Path>) -> AuditRecord {
    let record = session.finalize();
    let Some(dir) = audit_dir else {
        return record;
    };

    match FsAuditStore::new(dir) {
        Ok(store) => match store.save(&record) {
            Ok(path) => {
                tracing::info!(
                    run_id = %record.id,
                    path = %path.display(),
                    "Audit record stored for grooming run"
                );
            }
            Err(e) => tracing::warn!(error = %e, "Failed to store audit record"),
        },
        Err(e) => tracing::warn!(error = %e, "Failed to initialize audit store"),
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use groom_audit::store::AuditQuery;

    #[test]
    fn stored_record_carries_the_run_summary() {
        let dir = tempfile::tempdir().unwrap();
        let options = GroomOptions::default();
        let mut session = start_run_session(RunMode::ReportOnly, &options);
        let mut report = RunReport::new(session.id(), RunMode::ReportOnly, vec!["pserver".into()]);
        report.counters.nodes_scanned = 3;
        record_run_results(&mut session, &report, Path::new("/tmp/groom.out"));

        let record = finalize_and_store(session, Some(dir.path()));
        assert_eq!(record.options["max_fix"], 10);

        let store = FsAuditStore::new(dir.path()).unwrap();
        let listed = store.list(&AuditQuery::default()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].summary.as_ref().unwrap().nodes_scanned, 3);
        assert_eq!(listed[0].report_path.as_deref(), Some("/tmp/groom.out"));
    }

    #[test]
    fn unwritable_audit_dir_does_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let session = start_run_session(RunMode::Fix, &GroomOptions::default());
        let record = finalize_and_store(session, Some(&blocker));
        assert!(record.verify_integrity());
    }
}
