//! BLAKE3 content hashing for tamper evidence.

use serde::Serialize;

use crate::{AuditRecord, MutationEntry, RunId, RunMode, RunSummary};

/// Hashable view of an audit record (everything but `content_hash`).
#[derive(Serialize)]
struct HashableRecord<'a> {
    id: &'a RunId,
    mode: &'a RunMode,
    options: &'a serde_json::Value,
    candidates_loaded: u64,
    candidates_discarded: bool,
    mutations: &'a [MutationEntry],
    summary: &'a Option<RunSummary>,
    report_path: &'a Option<String>,
    failure: &'a Option<String>,
    started_at: &'a chrono::DateTime<chrono::Utc>,
    completed_at: &'a Option<chrono::DateTime<chrono::Utc>>,
}

/// Hex-encoded BLAKE3 hash of the record's canonical JSON form.
pub fn compute_record_hash(record: &AuditRecord) -> String {
    let hashable = HashableRecord {
        id: &record.id,
        mode: &record.mode,
        options: &record.options,
        candidates_loaded: record.candidates_loaded,
        candidates_discarded: record.candidates_discarded,
        mutations: &record.mutations,
        summary: &record.summary,
        report_path: &record.report_path,
        failure: &record.failure,
        started_at: &record.started_at,
        completed_at: &record.completed_at,
    };

    // Every field is plain data; serialization cannot fail.
    let json = serde_json::to_vec(&hashable).unwrap_or_default();
    blake3::hash(&json).to_hex().to_string()
}
