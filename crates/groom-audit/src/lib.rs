//! groom-audit: Tamper-evident record of what a grooming run changed.
//!
//! Every run produces one `AuditRecord`: the options it ran with, how many
//! delete candidates it was handed, every mutation it queued (and whether the
//! batch holding it committed), and the final counters. Records are sealed
//! with a BLAKE3 content hash and stored as JSON files organised by date.

pub mod hash;
pub mod session;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Core Types ───────────────────────────────────────────────────

/// Unique identifier for a grooming run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a run was allowed to mutate the graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// No candidate set was supplied (or it was discarded): read only.
    ReportOnly,
    /// A candidate set authorised mutations.
    Fix,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ReportOnly => "report-only",
            Self::Fix => "fix",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MutationKind {
    DeleteVertex,
    DeleteEdge,
    IndexRepair,
}

/// Which graph handle carried a mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HandleRole {
    Primary,
    Verification,
}

/// A single queued mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationEntry {
    pub kind: MutationKind,
    /// Vertex id, or edge id for `DeleteEdge`.
    pub element: i64,
    /// Finding category that justified the mutation.
    pub category: String,
    pub handle: HandleRole,
    /// Whether the transaction holding this mutation committed.
    pub committed: bool,
    pub timestamp: DateTime<Utc>,
}

/// Final counters of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub nodes_scanned: u64,
    pub edges_scanned: u64,
    pub findings: u64,
    pub deletes: u64,
    pub index_repairs: u64,
    pub duplicate_groups: u64,
    pub errors: u64,
}

/// The audit record of one grooming run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub id: RunId,
    pub mode: RunMode,
    /// Options the run was invoked with.
    pub options: serde_json::Value,
    /// Candidate ids read from the previous report, after filtering.
    pub candidates_loaded: u64,
    /// Whether the candidate set was discarded for exceeding the fix cap.
    pub candidates_discarded: bool,
    pub mutations: Vec<MutationEntry>,
    pub summary: Option<RunSummary>,
    /// Report file written by the run, if any.
    pub report_path: Option<String>,
    /// Fatal error that ended the run early, if any.
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// BLAKE3 content hash (hex), set on finalization.
    pub content_hash: Option<String>,
}

impl AuditRecord {
    /// Compute the BLAKE3 hash over every field except `content_hash`.
    pub fn compute_hash(&self) -> String {
        hash::compute_record_hash(self)
    }

    /// Verify that the stored content hash matches the content.
    pub fn verify_integrity(&self) -> bool {
        match &self.content_hash {
            Some(stored) => stored == &self.compute_hash(),
            None => false,
        }
    }

    /// Mutations whose batch actually committed.
    pub fn committed_mutations(&self) -> impl Iterator<Item = &MutationEntry> {
        self.mutations.iter().filter(|m| m.committed)
    }
}
