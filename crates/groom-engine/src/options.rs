//! Per-invocation run options.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use groom_core::{TypeCatalog, Vertex};
use serde::Serialize;

use crate::candidates::CandidateFilter;
use crate::error::{GroomError, Result};

/// Everything that shapes a single run.
#[derive(Debug, Clone, Serialize)]
pub struct GroomOptions {
    /// Report of an earlier run whose delete candidates authorise mutation.
    pub previous_report: Option<PathBuf>,
    /// Candidate sets larger than this are discarded.
    pub max_fix: usize,
    /// Only check edges; vertex classification is skipped.
    pub edges_only: bool,
    pub skip_edge_checks: bool,
    pub skip_orphan_fix: bool,
    pub skip_dupe_check: bool,
    /// Delete non-keeper members of resolved duplicate groups.
    pub dupe_fix: bool,
    pub skip_ghost2_check: bool,
    /// Delete ghost2-confirmed endpoints through the verification handle.
    pub ghost2_fix: bool,
    /// Delete missing-discriminator vertices instead of repairing their indexes.
    pub skip_index_update_fix: bool,
    /// Only scan vertices modified in the last N minutes. 0 scans everything.
    pub time_window_minutes: u64,
    /// Restrict the vertex scan to one node type.
    pub node_type: Option<String>,
    /// Commit after each node type instead of once at the end.
    pub single_commits: bool,
    /// Open the primary handle on a fresh connection.
    pub never_use_cache: bool,
    pub output_dir: PathBuf,
    /// Where audit records go. `None` disables the audit trail.
    pub audit_dir: Option<PathBuf>,
    /// Abort the run after this many minutes. 0 means unbounded.
    pub max_run_minutes: u64,
}

impl Default for GroomOptions {
    fn default() -> Self {
        Self {
            previous_report: None,
            max_fix: 10,
            edges_only: false,
            skip_edge_checks: false,
            skip_orphan_fix: false,
            skip_dupe_check: false,
            dupe_fix: false,
            skip_ghost2_check: false,
            ghost2_fix: false,
            skip_index_update_fix: false,
            time_window_minutes: 0,
            node_type: None,
            single_commits: false,
            never_use_cache: false,
            output_dir: PathBuf::from("./reports"),
            audit_dir: None,
            max_run_minutes: 0,
        }
    }
}

impl GroomOptions {
    /// Reject contradictory flags and unknown node types before anything runs.
    pub fn validate(&self, catalog: &dyn TypeCatalog) -> Result<()> {
        if self.edges_only && self.skip_edge_checks {
            return Err(GroomError::InvalidOption(
                "edges-only and skip-edge-checks exclude each other".into(),
            ));
        }
        if self.edges_only && self.node_type.is_some() {
            return Err(GroomError::InvalidOption(
                "a node type filter has no effect in edges-only mode".into(),
            ));
        }
        if self.ghost2_fix && self.skip_ghost2_check {
            return Err(GroomError::InvalidOption(
                "ghost2-fix requires the ghost2 check".into(),
            ));
        }
        if let Some(node_type) = &self.node_type {
            if catalog.descriptor(node_type).is_none() {
                return Err(groom_core::CatalogError::UnknownType(node_type.clone()).into());
            }
        }
        Ok(())
    }

    /// Node types the vertex scan walks, in catalog order.
    pub fn node_types(&self, catalog: &dyn TypeCatalog) -> Vec<String> {
        if self.edges_only {
            return Vec::new();
        }
        match &self.node_type {
            Some(t) => vec![t.clone()],
            None => catalog.node_types(),
        }
    }

    pub fn candidate_filter(&self) -> CandidateFilter {
        CandidateFilter {
            skip_orphans: self.skip_orphan_fix,
            skip_duplicates: self.skip_dupe_check || !self.dupe_fix,
            edges_only: self.edges_only,
        }
    }

    pub fn window_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.time_window_minutes == 0 {
            return None;
        }
        let cutoff = i64::try_from(self.time_window_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .and_then(|window| now.checked_sub_signed(window));
        Some(cutoff.unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    pub fn run_limit(&self) -> Option<Duration> {
        (self.max_run_minutes > 0)
            .then(|| Duration::from_secs(self.max_run_minutes.saturating_mul(60)))
    }
}

/// Whether a vertex falls inside the scan window. Vertices without a
/// timestamp are always scanned.
pub fn in_window(vertex: &Vertex, cutoff: Option<DateTime<Utc>>) -> bool {
    match (cutoff, vertex.last_modified()) {
        (Some(cutoff), Some(modified)) => modified >= cutoff,
        _ => true,
    }
}
