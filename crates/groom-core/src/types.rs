//! Core data model for the property graph being groomed.
//!
//! Vertices and edges carry a string-keyed property bag of tagged scalar
//! values. The discriminator, canonical URI, unique key and timestamp live in
//! that bag under reserved names rather than as struct fields, because their
//! absence is itself the corruption signal the engine looks for.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ── Reserved property names ───────────────────────────────────────

/// Node-type discriminator.
pub const NODE_TYPE: &str = "aai-node-type";
/// Canonical URI of the vertex.
pub const URI: &str = "aai-uri";
/// Store-wide unique key.
pub const UNIQUE_KEY: &str = "aai-unique-key";
pub const UUID: &str = "aai-uuid";
pub const SOURCE_OF_TRUTH: &str = "source-of-truth";
/// Last-modified timestamp in epoch milliseconds.
pub const LAST_MOD_TS: &str = "aai-last-mod-ts";

/// Edge marker naming which endpoint contains the other.
pub const CONTAINS_OTHER_V: &str = "contains-other-v";
/// Edge marker naming which endpoint is deleted along with the other.
pub const DELETE_OTHER_V: &str = "delete-other-v";

/// Indexed properties every vertex carries regardless of its node type.
pub const RESERVED_INDEXED: [&str; 5] = [NODE_TYPE, URI, UNIQUE_KEY, UUID, SOURCE_OF_TRUTH];

/// Suffix of the synthetic placeholder written by index repair.
pub const DUMMY_SUFFIX: &str = "dummy";

// ── Identifiers ───────────────────────────────────────────────────

/// Store-assigned vertex identifier. Stable and totally ordered, which makes
/// it the final tie-breaker when two vertices claim the same identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(pub i64);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned edge identifier. Edge ids are numbered independently from
/// vertex ids, so the two are never mixed in one set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub i64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Property values ───────────────────────────────────────────────

/// A scalar property value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    String(String),
    Long(i64),
    Integer(i32),
    Boolean(bool),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            Self::Integer(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::String(_) => PropertyKind::String,
            Self::Long(_) => PropertyKind::Long,
            Self::Integer(_) => PropertyKind::Integer,
            Self::Boolean(_) => PropertyKind::Boolean,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

/// Declared scalar type of an indexed property.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    #[default]
    String,
    Long,
    Integer,
    Boolean,
}

impl PropertyKind {
    /// Deterministic placeholder written over a corrupted indexed property.
    pub fn placeholder(self, id: VertexId) -> PropertyValue {
        match self {
            Self::String => PropertyValue::String(dummy_marker(id)),
            Self::Long => PropertyValue::Long(id.0),
            Self::Integer => PropertyValue::Integer(i32::try_from(id.0).unwrap_or(0)),
            Self::Boolean => PropertyValue::Boolean(false),
        }
    }
}

/// The synthetic `"<id>dummy"` string placeholder for a vertex.
pub fn dummy_marker(id: VertexId) -> String {
    format!("{}{DUMMY_SUFFIX}", id.0)
}

pub type Properties = BTreeMap<String, PropertyValue>;

// ── Vertices ──────────────────────────────────────────────────────

/// A vertex as read from the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vertex {
    pub id: VertexId,
    pub properties: Properties,
}

impl Vertex {
    pub fn new(id: VertexId) -> Self {
        Self {
            id,
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// The node-type discriminator, if present and non-empty.
    pub fn node_type(&self) -> Option<&str> {
        self.property(NODE_TYPE)
            .and_then(PropertyValue::as_str)
            .filter(|t| !t.is_empty())
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        let millis = self.property(LAST_MOD_TS)?.as_i64()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    /// Values of the given key properties in declaration order, or `None`
    /// when any of them is missing.
    pub fn key_values(&self, key_properties: &[String]) -> Option<Vec<(String, PropertyValue)>> {
        key_properties
            .iter()
            .map(|k| self.property(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    /// Whether an earlier index repair already stamped this vertex with the
    /// synthetic placeholder.
    pub fn has_dummy_marker(&self) -> bool {
        let marker = dummy_marker(self.id);
        [UNIQUE_KEY, URI, NODE_TYPE]
            .iter()
            .any(|p| self.property(p).and_then(PropertyValue::as_str) == Some(marker.as_str()))
    }
}

// ── Edges ─────────────────────────────────────────────────────────

/// Direction in which to follow edges from a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

/// Value of a direction-qualified edge marker such as `contains-other-v`.
///
/// `Out` means the edge's out-vertex holds the relationship over its
/// in-vertex; `In` means the reverse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum EdgeMarker {
    Out,
    In,
    #[default]
    None,
}

impl EdgeMarker {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OUT" => Self::Out,
            "IN" => Self::In,
            _ => Self::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Out => "OUT",
            Self::In => "IN",
            Self::None => "NONE",
        }
    }
}

/// An edge as read from the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub label: String,
    /// Tail of the edge.
    pub out_vertex: VertexId,
    /// Head of the edge.
    pub in_vertex: VertexId,
    pub contains_other_v: EdgeMarker,
    pub delete_other_v: EdgeMarker,
    pub properties: Properties,
}

impl Edge {
    /// If this is a containment edge touching `child`, the id of the
    /// containing vertex.
    pub fn parent_of(&self, child: VertexId) -> Option<VertexId> {
        match self.contains_other_v {
            EdgeMarker::Out if self.in_vertex == child => Some(self.out_vertex),
            EdgeMarker::In if self.out_vertex == child => Some(self.in_vertex),
            _ => None,
        }
    }

    /// If this is a containment edge rooted at `parent`, the contained vertex.
    pub fn child_of(&self, parent: VertexId) -> Option<VertexId> {
        match self.contains_other_v {
            EdgeMarker::Out if self.out_vertex == parent => Some(self.in_vertex),
            EdgeMarker::In if self.in_vertex == parent => Some(self.out_vertex),
            _ => None,
        }
    }

    /// The endpoint opposite `id`, if `id` is an endpoint at all.
    pub fn other_end(&self, id: VertexId) -> Option<VertexId> {
        if self.out_vertex == id {
            Some(self.in_vertex)
        } else if self.in_vertex == id {
            Some(self.out_vertex)
        } else {
            None
        }
    }
}
