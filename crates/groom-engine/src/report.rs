//! Findings, counters, and the report file a run leaves behind.
//!
//! The report doubles as the candidate input of the next run, so every
//! finding that could be repaired is written with the delete-candidate
//! grammar parsed in [`crate::candidates`].

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use groom_audit::{RunId, RunMode, RunSummary};
use groom_core::{EdgeId, ErrorCategory, VertexId};
use serde::Serialize;

use crate::candidates::CandidateKind;
use crate::error::{GroomError, Result};

/// How a ghost was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GhostSource {
    /// Top-level key lookup did not resolve the vertex.
    KeyLookup,
    /// The parent's children did not include the vertex under its key.
    ParentScope,
    /// A fresh connection could not fetch an edge endpoint at all.
    SecondHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Keeper {
    Determined(VertexId),
    Undetermined,
}

impl Keeper {
    pub fn vertex(self) -> Option<VertexId> {
        match self {
            Self::Determined(id) => Some(id),
            Self::Undetermined => None,
        }
    }
}

impl std::fmt::Display for Keeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Determined(id) => write!(f, "{id}"),
            Self::Undetermined => f.write_str("UNDETERMINED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub node_type: String,
    /// Members in ascending id order.
    pub members: Vec<VertexId>,
    pub keeper: Keeper,
}

impl DuplicateGroup {
    pub fn non_keepers(&self) -> impl Iterator<Item = VertexId> + '_ {
        let keeper = self.keeper.vertex();
        self.members
            .iter()
            .copied()
            .filter(move |id| Some(*id) != keeper)
    }

    /// `id1|id2|...|KeepVid=<id|UNDETERMINED>`
    pub fn detail_line(&self) -> String {
        let mut line = String::new();
        for id in &self.members {
            let _ = write!(line, "{id}|");
        }
        let _ = write!(line, "KeepVid={}", self.keeper);
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Finding {
    Ghost {
        vertex: VertexId,
        node_type: Option<String>,
        source: GhostSource,
    },
    Orphan {
        vertex: VertexId,
        node_type: String,
    },
    MissingDiscriminator {
        vertex: VertexId,
        /// Type the index filed the vertex under, when known.
        node_type: Option<String>,
    },
    Duplicates(DuplicateGroup),
    DanglingEdge {
        edge: EdgeId,
        endpoint: VertexId,
    },
}

impl Finding {
    /// Delete-candidate lines this finding contributes to the report.
    pub fn candidate_lines(&self) -> Vec<String> {
        match self {
            Self::Ghost { vertex, .. } => vec![CandidateKind::Phantom.line(vertex.0)],
            Self::Orphan { vertex, .. } => vec![CandidateKind::Orphan.line(vertex.0)],
            Self::MissingDiscriminator { vertex, .. } => {
                vec![CandidateKind::MissingNodeType.line(vertex.0)]
            }
            Self::Duplicates(group) => group
                .non_keepers()
                .filter(|_| group.keeper != Keeper::Undetermined)
                .map(|id| CandidateKind::Duplicate.line(id.0))
                .collect(),
            Self::DanglingEdge { edge, .. } => vec![CandidateKind::BadEdge.line(edge.0)],
        }
    }
}

/// A per-element failure that did not stop the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementError {
    pub category: ErrorCategory,
    /// What was being processed, e.g. `vertex 12` or `edge 7`.
    pub element: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub nodes_scanned: u64,
    pub edges_scanned: u64,
    /// Committed deletes of vertices and edges.
    pub deletes: u64,
    /// Committed index-only repairs.
    pub index_repairs: u64,
    pub duplicate_groups: u64,
}

/// Everything one run found and did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub node_types: Vec<String>,
    pub candidates_loaded: usize,
    pub candidates_discarded: bool,
    pub findings: Vec<Finding>,
    /// Duplicate groups whose non-keepers were all deleted this run.
    pub resolved_groups: Vec<DuplicateGroup>,
    pub counters: RunCounters,
    pub errors: Vec<ElementError>,
    /// Set when the run ended early.
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn new(run_id: RunId, mode: RunMode, node_types: Vec<String>) -> Self {
        Self {
            run_id,
            mode,
            started_at: Utc::now(),
            node_types,
            candidates_loaded: 0,
            candidates_discarded: false,
            findings: Vec::new(),
            resolved_groups: Vec::new(),
            counters: RunCounters::default(),
            errors: Vec::new(),
            aborted: None,
        }
    }

    pub fn record_error(&mut self, category: ErrorCategory, element: String, message: String) {
        tracing::warn!(%category, %element, %message, "Element skipped");
        self.errors.push(ElementError {
            category,
            element,
            message,
        });
    }

    pub fn has_findings(&self) -> bool {
        !self.findings.is_empty()
    }

    pub fn ghosts(&self) -> Vec<VertexId> {
        self.collect(|f| match f {
            Finding::Ghost { vertex, .. } => Some(*vertex),
            _ => None,
        })
    }

    pub fn orphans(&self) -> Vec<VertexId> {
        self.collect(|f| match f {
            Finding::Orphan { vertex, .. } => Some(*vertex),
            _ => None,
        })
    }

    pub fn missing_discriminator(&self) -> Vec<VertexId> {
        self.collect(|f| match f {
            Finding::MissingDiscriminator { vertex, .. } => Some(*vertex),
            _ => None,
        })
    }

    pub fn duplicate_groups(&self) -> Vec<&DuplicateGroup> {
        self.findings
            .iter()
            .filter_map(|f| match f {
                Finding::Duplicates(group) => Some(group),
                _ => None,
            })
            .collect()
    }

    pub fn dangling_edges(&self) -> Vec<(EdgeId, VertexId)> {
        self.collect(|f| match f {
            Finding::DanglingEdge { edge, endpoint } => Some((*edge, *endpoint)),
            _ => None,
        })
    }

    fn collect<T>(&self, pick: impl Fn(&Finding) -> Option<T>) -> Vec<T> {
        self.findings.iter().filter_map(pick).collect()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            nodes_scanned: self.counters.nodes_scanned,
            edges_scanned: self.counters.edges_scanned,
            findings: self.findings.len() as u64,
            deletes: self.counters.deletes,
            index_repairs: self.counters.index_repairs,
            duplicate_groups: self.counters.duplicate_groups,
            errors: self.errors.len() as u64,
        }
    }

    /// Full text of the report file.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let c = &self.counters;
        let types = if self.node_types.is_empty() {
            "none".to_string()
        } else {
            self.node_types.join(",")
        };

        let _ = writeln!(out, "# graph-groom report");
        let _ = writeln!(out, "# run-id: {}", self.run_id);
        let _ = writeln!(out, "# mode: {}", self.mode);
        let _ = writeln!(out, "# started: {}", self.started_at.to_rfc3339());
        let _ = writeln!(out, "# node-types: {types}");
        let _ = writeln!(out, "# candidates-loaded: {}", self.candidates_loaded);
        let _ = writeln!(out, "# candidates-discarded: {}", self.candidates_discarded);
        let _ = writeln!(out, "# nodes-scanned: {}", c.nodes_scanned);
        let _ = writeln!(out, "# edges-scanned: {}", c.edges_scanned);
        let _ = writeln!(out, "# deletes: {}", c.deletes);
        let _ = writeln!(out, "# index-repairs: {}", c.index_repairs);
        let _ = writeln!(out, "# duplicate-groups: {}", c.duplicate_groups);
        let _ = writeln!(out, "# duplicate-groups-resolved: {}", self.resolved_groups.len());
        let _ = writeln!(out, "# findings: {}", self.findings.len());
        for e in &self.errors {
            let _ = writeln!(out, "# error [{}] {}: {}", e.category, e.element, e.message);
        }

        for finding in &self.findings {
            for line in finding.candidate_lines() {
                let _ = writeln!(out, "{line}");
            }
        }
        for group in self.duplicate_groups() {
            let _ = writeln!(out, "{}", group.detail_line());
        }
        // Last line, so a truncated body is recognisable.
        if let Some(reason) = &self.aborted {
            let _ = writeln!(out, "# aborted: {reason}");
        }
        out
    }
}

/// Owns the report file of one run.
///
/// The file is created as soon as the run starts so an unwritable output
/// directory fails before any scanning; the body is written once at the end.
pub struct ReportWriter {
    path: PathBuf,
    file: File,
}

impl ReportWriter {
    /// Create `<dir>/groom.<YYYYMMDDHHMMSS>.out`. A second run within the same
    /// second gets a `-<n>` suffix rather than overwriting the first report.
    pub fn create(dir: &Path, now: DateTime<Utc>) -> Result<Self> {
        let unwritable = |path: &Path, source| GroomError::ReportUnwritable {
            path: path.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(|e| unwritable(dir, e))?;

        let stamp = now.format("%Y%m%d%H%M%S");
        for attempt in 0..100u32 {
            let name = match attempt {
                0 => format!("groom.{stamp}.out"),
                n => format!("groom.{stamp}-{n}.out"),
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok(Self { path, file }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(unwritable(&path, e)),
            }
        }
        Err(unwritable(
            dir,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "no free report name"),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(mut self, report: &RunReport) -> Result<PathBuf> {
        self.file.write_all(report.render().as_bytes())?;
        self.file.sync_all()?;
        tracing::info!(path = %self.path.display(), findings = report.findings.len(), "Report written");
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::{CandidateFilter, CandidateSet};

    fn sample() -> RunReport {
        let mut report = RunReport::new(RunId::new(), RunMode::ReportOnly, vec!["pserver".into()]);
        report.findings.push(Finding::Ghost {
            vertex: VertexId(4),
            node_type: Some("pserver".into()),
            source: GhostSource::KeyLookup,
        });
        report.findings.push(Finding::Duplicates(DuplicateGroup {
            node_type: "pserver".into(),
            members: vec![VertexId(5), VertexId(6), VertexId(7)],
            keeper: Keeper::Determined(VertexId(6)),
        }));
        report.findings.push(Finding::Duplicates(DuplicateGroup {
            node_type: "pserver".into(),
            members: vec![VertexId(8), VertexId(9)],
            keeper: Keeper::Undetermined,
        }));
        report.findings.push(Finding::DanglingEdge {
            edge: EdgeId(3),
            endpoint: VertexId(10),
        });
        report.record_error(ErrorCategory::Data, "vertex 12".into(), "unreadable".into());
        report
    }

    #[test]
    fn render_lists_candidates_and_group_details() {
        let text = sample().render();
        assert!(text.contains("DeleteCandidate: Phantom Vid = [4]\n"));
        assert!(text.contains("DeleteCandidate: Duplicate Vid = [5]\n"));
        assert!(text.contains("DeleteCandidate: Duplicate Vid = [7]\n"));
        assert!(!text.contains("Vid = [6]"));
        assert!(!text.contains("Vid = [8]"));
        assert!(text.contains("DeleteCandidate: Bad EDGE Edge-id = [3]\n"));
        assert!(text.contains("5|6|7|KeepVid=6\n"));
        assert!(text.contains("8|9|KeepVid=UNDETERMINED\n"));
        assert!(text.contains("# error [data] vertex 12: unreadable\n"));
    }

    #[test]
    fn rendered_report_feeds_the_next_run() {
        let filter = CandidateFilter {
            skip_duplicates: false,
            ..Default::default()
        };
        let set = CandidateSet::parse(&sample().render(), filter).unwrap();
        assert_eq!(set.len(), 4);
        assert!(set.contains_vertex(VertexId(7)));
        assert!(set.contains_edge(EdgeId(3)));
    }

    #[test]
    fn writer_never_overwrites_an_earlier_report() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let first = ReportWriter::create(dir.path(), now).unwrap();
        let second = ReportWriter::create(dir.path(), now).unwrap();
        assert_ne!(first.path(), second.path());

        let path = first.write(&sample()).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("groom.") && name.ends_with(".out"));
        assert!(std::fs::read_to_string(path).unwrap().starts_with("# graph-groom report"));
    }

    #[test]
    fn unwritable_directory_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let err = ReportWriter::create(&blocker.join("sub"), Utc::now()).err().unwrap();
        assert_eq!(err.category(), ErrorCategory::Config);
    }
}
