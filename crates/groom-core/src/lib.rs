//! groom-core: Shared graph model, store interfaces, and type catalog for graph grooming.
//!
//! This crate provides the foundations every other grooming crate builds on:
//! - Vertex / edge model with tagged scalar property values
//! - The `GraphAccess` and `GraphProvider` store interfaces
//! - The `TypeCatalog` schema view and its JSON-backed implementation
//! - An in-memory store that can represent index drift
//! - Common error types

pub mod access;
pub mod catalog;
pub mod error;
pub mod memory;
pub mod types;

pub use access::{ConnectionMode, GraphAccess, GraphProvider};
pub use catalog::{NodeTypeDescriptor, SchemaCatalog, TypeCatalog};
pub use error::{CatalogError, ErrorCategory, GraphError};
pub use types::{Edge, EdgeId, EdgeMarker, PropertyKind, PropertyValue, Vertex, VertexId};
