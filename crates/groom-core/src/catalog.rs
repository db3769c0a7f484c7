//! Read-only schema introspection: which properties key a node type, which
//! are indexed, and which node types a dependent type hangs under.
//!
//! The catalog is loaded once from a JSON document and passed explicitly to
//! everything that needs it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::CatalogError;
use crate::types::{PropertyKind, NODE_TYPE, SOURCE_OF_TRUTH, UNIQUE_KEY, URI, UUID};

/// Upper bound on key properties the key-lookup query supports.
pub const MAX_KEY_PROPERTIES: usize = 4;

/// Schema facts about a single node type.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NodeTypeDescriptor {
    pub name: String,
    /// Key properties in declaration order.
    pub key_properties: Vec<String>,
    /// Indexed properties and their declared scalar kind.
    #[serde(default)]
    pub indexed_properties: BTreeMap<String, PropertyKind>,
    /// Node types a vertex of this type may be contained by. Empty for
    /// independent (top-level) types.
    #[serde(default)]
    pub dependent_on: BTreeSet<String>,
}

impl NodeTypeDescriptor {
    pub fn is_top_level(&self) -> bool {
        self.dependent_on.is_empty()
    }

    /// Every property index repair must overwrite, with the kind used to
    /// build its placeholder. Reserved names come first; declared indexed
    /// properties follow. Key properties not declared as indexed are
    /// treated as strings.
    pub fn repairable_properties(&self) -> Vec<(String, PropertyKind)> {
        let mut out: BTreeMap<String, PropertyKind> = BTreeMap::new();
        for name in [URI, UNIQUE_KEY, UUID, SOURCE_OF_TRUTH] {
            out.insert(name.to_string(), PropertyKind::String);
        }
        for key in &self.key_properties {
            out.insert(key.clone(), PropertyKind::String);
        }
        for (name, kind) in &self.indexed_properties {
            out.insert(name.clone(), *kind);
        }
        out.remove(NODE_TYPE);
        out.into_iter().collect()
    }
}

/// Read-only view of the graph schema.
pub trait TypeCatalog: Send + Sync {
    fn descriptor(&self, node_type: &str) -> Option<&NodeTypeDescriptor>;

    /// All known node types, sorted.
    fn node_types(&self) -> Vec<String>;
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    node_types: Vec<NodeTypeDescriptor>,
}

/// A catalog held in memory, usually loaded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    types: BTreeMap<String, NodeTypeDescriptor>,
}

impl SchemaCatalog {
    /// Build from descriptors, enforcing the catalog invariants.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = NodeTypeDescriptor>,
    ) -> Result<Self, CatalogError> {
        let mut types = BTreeMap::new();
        for d in descriptors {
            if d.key_properties.is_empty() {
                return Err(CatalogError::NoKeys(d.name));
            }
            if d.key_properties.len() > MAX_KEY_PROPERTIES {
                return Err(CatalogError::TooManyKeys {
                    count: d.key_properties.len(),
                    node_type: d.name,
                    max: MAX_KEY_PROPERTIES,
                });
            }
            if types.contains_key(&d.name) {
                return Err(CatalogError::DuplicateType(d.name));
            }
            types.insert(d.name.clone(), d);
        }
        Ok(Self { types })
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Self::from_descriptors(doc.node_types)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_json(&json)?;
        tracing::info!(
            path = %path.as_ref().display(),
            node_types = catalog.types.len(),
            "Type catalog loaded"
        );
        Ok(catalog)
    }

    /// Look up a descriptor, failing on unknown types.
    pub fn require(&self, node_type: &str) -> Result<&NodeTypeDescriptor, CatalogError> {
        self.types
            .get(node_type)
            .ok_or_else(|| CatalogError::UnknownType(node_type.to_string()))
    }
}

impl TypeCatalog for SchemaCatalog {
    fn descriptor(&self, node_type: &str) -> Option<&NodeTypeDescriptor> {
        self.types.get(node_type)
    }

    fn node_types(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }
}
