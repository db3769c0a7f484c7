//! Delete candidates carried over from an earlier report.
//!
//! Only lines of the form
//!
//! ```text
//! DeleteCandidate: <category> Vid = [<id>]
//! DeleteCandidate: Bad EDGE Edge-id = [<id>]
//! ```
//!
//! are read; everything else in the report is ignored.

use std::collections::BTreeSet;
use std::path::Path;

use groom_core::{EdgeId, VertexId};

use crate::error::{GroomError, Result};

pub const LINE_PREFIX: &str = "DeleteCandidate: ";
const VERTEX_ID_TAG: &str = " Vid = [";
const EDGE_ID_TAG: &str = " Edge-id = [";

/// Finding category named on a delete-candidate line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Phantom,
    MissingNodeType,
    Orphan,
    Duplicate,
    BadEdge,
}

impl CandidateKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Phantom => "Phantom",
            Self::MissingNodeType => "Missing aai-node-type",
            Self::Orphan => "OrphanDepNode",
            Self::Duplicate => "Duplicate",
            Self::BadEdge => "Bad EDGE",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        [
            Self::Phantom,
            Self::MissingNodeType,
            Self::Orphan,
            Self::Duplicate,
            Self::BadEdge,
        ]
        .into_iter()
        .find(|k| k.label() == label)
    }

    /// The report line naming `id` under this category.
    pub fn line(self, id: i64) -> String {
        let tag = match self {
            Self::BadEdge => EDGE_ID_TAG,
            _ => VERTEX_ID_TAG,
        };
        format!("{LINE_PREFIX}{}{tag}{id}]", self.label())
    }
}

/// Categories of candidate lines to leave out of the set.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateFilter {
    pub skip_orphans: bool,
    pub skip_duplicates: bool,
    /// Keep only edge lines.
    pub edges_only: bool,
}

impl CandidateFilter {
    fn admits(&self, kind: CandidateKind) -> bool {
        match kind {
            CandidateKind::Orphan if self.skip_orphans => false,
            CandidateKind::Duplicate if self.skip_duplicates => false,
            CandidateKind::BadEdge => true,
            _ => !self.edges_only,
        }
    }
}

/// Ids authorised for mutation. Vertex and edge ids are numbered
/// independently by the store, so they are kept apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    vertices: BTreeSet<VertexId>,
    edges: BTreeSet<EdgeId>,
}

impl CandidateSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path, filter: CandidateFilter) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| GroomError::CandidateFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let set = Self::parse(&text, filter).map_err(|message| GroomError::CandidateFile {
            path: path.to_path_buf(),
            message,
        })?;
        tracing::info!(
            path = %path.display(),
            vertices = set.vertices.len(),
            edges = set.edges.len(),
            "Delete candidates loaded"
        );
        Ok(set)
    }

    /// Parse report text. A recognised line with an unreadable id is an error.
    pub fn parse(text: &str, filter: CandidateFilter) -> std::result::Result<Self, String> {
        let mut set = Self::default();
        for (n, line) in text.lines().enumerate() {
            let Some((kind, raw_id)) = split_line(line.trim()) else {
                continue;
            };
            let id: i64 = raw_id
                .trim()
                .parse()
                .map_err(|_| format!("line {}: unreadable id {raw_id:?}", n + 1))?;
            if !filter.admits(kind) {
                continue;
            }
            match kind {
                CandidateKind::BadEdge => set.edges.insert(EdgeId(id)),
                _ => set.vertices.insert(VertexId(id)),
            };
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.vertices.len() + self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_vertex(&self, id: VertexId) -> bool {
        self.vertices.contains(&id)
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edges.contains(&id)
    }

    /// Drop the whole set when it exceeds `max_fix`. Returns whether it
    /// was dropped.
    pub fn enforce_cap(&mut self, max_fix: usize) -> bool {
        if self.len() <= max_fix {
            return false;
        }
        tracing::warn!(
            candidates = self.len(),
            max_fix,
            "Candidate set exceeds the fix cap; running report-only"
        );
        *self = Self::empty();
        true
    }
}

fn split_line(line: &str) -> Option<(CandidateKind, &str)> {
    let rest = line.strip_prefix(LINE_PREFIX)?;
    let (label, id) = rest
        .split_once(EDGE_ID_TAG)
        .filter(|(label, _)| *label == CandidateKind::BadEdge.label())
        .or_else(|| rest.split_once(VERTEX_ID_TAG))?;
    let kind = CandidateKind::from_label(label)?;
    if (kind == CandidateKind::BadEdge) != rest.contains(EDGE_ID_TAG) {
        return None;
    }
    Some((kind, id.strip_suffix(']')?))
}
