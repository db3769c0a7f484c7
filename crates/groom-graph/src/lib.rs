//! groom-graph: Neo4j implementation of the grooming store interface.
//!
//! Reads go straight to the database. Writes are built as Cypher statements,
//! buffered per handle, and applied in a single transaction on commit.

pub mod client;
pub mod handle;
pub mod mutations;
pub mod queries;

pub use client::{ClientError, GraphClient, GraphConfig};
pub use handle::{Neo4jGraph, Neo4jProvider};
