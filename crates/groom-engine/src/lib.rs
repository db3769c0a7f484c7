//! groom-engine: consistency grooming for property graphs.
//!
//! Scans a graph for ghost vertices, orphans, vertices that lost their
//! discriminator, duplicate groups and dangling edges, writes the findings
//! to a report, and repairs only what a previous report named and the
//! current scan confirms.

pub mod audit;
pub mod candidates;
pub mod classifier;
pub mod config;
pub mod duplicates;
pub mod edges;
pub mod error;
pub mod gate;
pub mod mutator;
pub mod options;
pub mod report;

pub use candidates::{CandidateFilter, CandidateKind, CandidateSet};
pub use error::{GroomError, Result};
pub use gate::{RepairGate, RunOutcome};
pub use options::GroomOptions;
pub use report::{DuplicateGroup, Finding, GhostSource, Keeper, RunReport};
