//! Audit record storage: the store trait and its filesystem implementation.
//!
//! Records are stored as pretty JSON files organised by the run's start date:
//! ```text
//! {root}/
//!   2026/
//!     10/
//!       16/
//!         {run_id}.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::{AuditRecord, RunId, RunMode};

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Audit record not found: {0}")]
    NotFound(RunId),

    #[error("Integrity check failed for audit record {0}: stored hash does not match content")]
    IntegrityViolation(RunId),

    #[error("Audit record has no content hash (not finalized)")]
    NotFinalized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Filters for listing audit records.
#[derive(Debug, Default)]
pub struct AuditQuery {
    pub mode: Option<RunMode>,
    /// Only runs started at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Only runs started at or before this time.
    pub to: Option<DateTime<Utc>>,
}

pub trait AuditStore {
    /// Store a finalized record.
    fn save(&self, record: &AuditRecord) -> Result<PathBuf, AuditError>;

    /// Load a record by run id, verifying integrity.
    fn get(&self, id: RunId) -> Result<AuditRecord, AuditError>;

    /// Records matching `query`, newest first.
    fn list(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, AuditError>;
}

/// Filesystem-backed audit store.
pub struct FsAuditStore {
    root: PathBuf,
}

impl FsAuditStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn record_path(&self, record: &AuditRecord) -> PathBuf {
        let date = record.started_at.format("%Y/%m/%d");
        self.root.join(format!("{}/{}.json", date, record.id.0))
    }

    fn find_path(&self, id: RunId) -> Result<PathBuf, AuditError> {
        let filename = format!("{}.json", id.0);
        find_file_recursive(&self.root, &filename).ok_or(AuditError::NotFound(id))
    }
}

impl AuditStore for FsAuditStore {
    fn save(&self, record: &AuditRecord) -> Result<PathBuf, AuditError> {
        if record.content_hash.is_none() {
            return Err(AuditError::NotFinalized);
        }

        let path = self.record_path(record);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(record)?)?;

        tracing::debug!(run_id = %record.id, path = %path.display(), "Audit record saved");
        Ok(path)
    }

    fn get(&self, id: RunId) -> Result<AuditRecord, AuditError> {
        let path = self.find_path(id)?;
        let record: AuditRecord = serde_json::from_str(&fs::read_to_string(&path)?)?;
        if !record.verify_integrity() {
            return Err(AuditError::IntegrityViolation(id));
        }
        Ok(record)
    }

    fn list(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, AuditError> {
        let mut results = Vec::new();
        collect_recursive(&self.root, query, &mut results)?;
        results.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(results)
    }
}

fn find_file_recursive(dir: &Path, filename: &str) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    for entry in fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_file_recursive(&path, filename) {
                return Some(found);
            }
        } else if path.file_name().and_then(|n| n.to_str()) == Some(filename) {
            return Some(path);
        }
    }
    None
}

fn collect_recursive(
    dir: &Path,
    query: &AuditQuery,
    results: &mut Vec<AuditRecord>,
) -> Result<(), AuditError> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, query, results)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let record: AuditRecord = serde_json::from_str(&fs::read_to_string(&path)?)?;
            if matches_query(&record, query) {
                results.push(record);
            }
        }
    }
    Ok(())
}

fn matches_query(record: &AuditRecord, query: &AuditQuery) -> bool {
    if query.mode.is_some_and(|m| m != record.mode) {
        return false;
    }
    if query.from.is_some_and(|from| record.started_at < from) {
        return false;
    }
    if query.to.is_some_and(|to| record.started_at > to) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AuditSession;
    use crate::{HandleRole, MutationKind, RunSummary};

    fn finished_run(mode: RunMode) -> AuditRecord {
        let mut session = AuditSession::new(mode, serde_json::json!({"max_fix": 10}));
        session.set_candidates(1, false);
        session.stage(MutationKind::DeleteVertex, 7, "Phantom", HandleRole::Primary);
        session.settle_batch(true);
        session.set_summary(RunSummary {
            nodes_scanned: 12,
            deletes: 1,
            ..Default::default()
        });
        session.finalize()
    }

    #[test]
    fn save_and_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAuditStore::new(dir.path()).unwrap();
        let record = finished_run(RunMode::Fix);

        let path = store.save(&record).unwrap();
        assert!(path.starts_with(dir.path()));

        let loaded = store.get(record.id).unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.summary.unwrap().deletes, 1);
    }

    #[test]
    fn tampered_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAuditStore::new(dir.path()).unwrap();
        let record = finished_run(RunMode::Fix);
        store.save(&record).unwrap();

        let path = store.find_path(record.id).unwrap();
        let mut tampered: AuditRecord =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        tampered.mutations.clear();
        fs::write(&path, serde_json::to_string_pretty(&tampered).unwrap()).unwrap();

        assert!(matches!(
            store.get(record.id),
            Err(AuditError::IntegrityViolation(_))
        ));
    }

    #[test]
    fn unfinalized_records_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAuditStore::new(dir.path()).unwrap();
        let mut record = finished_run(RunMode::ReportOnly);
        record.content_hash = None;
        assert!(matches!(store.save(&record), Err(AuditError::NotFinalized)));
    }

    #[test]
    fn list_filters_by_mode() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAuditStore::new(dir.path()).unwrap();
        store.save(&finished_run(RunMode::Fix)).unwrap();
        store.save(&finished_run(RunMode::ReportOnly)).unwrap();
        store.save(&finished_run(RunMode::Fix)).unwrap();

        let fixes = store
            .list(&AuditQuery {
                mode: Some(RunMode::Fix),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(fixes.len(), 2);
        assert!(fixes.iter().all(|r| r.mode == RunMode::Fix));
        assert_eq!(store.list(&AuditQuery::default()).unwrap().len(), 3);
    }

    #[test]
    fn missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAuditStore::new(dir.path()).unwrap();
        assert!(matches!(store.get(RunId::new()), Err(AuditError::NotFound(_))));
    }
}
