//! Error types for the groom-engine crate.

use std::path::PathBuf;

use groom_core::{CatalogError, ErrorCategory, GraphError};
use thiserror::Error;

pub const EXIT_CLEAN: u8 = 0;
pub const EXIT_FINDINGS: u8 = 1;
pub const EXIT_DATA: u8 = 65;
pub const EXIT_TIMEOUT: u8 = 75;
pub const EXIT_CONFIG: u8 = 78;

#[derive(Error, Debug)]
pub enum GroomError {
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Candidate file {path}: {message}")]
    CandidateFile { path: PathBuf, message: String },

    #[error("Report file {path} is not writable: {source}")]
    ReportUnwritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not open graph handle: {0}")]
    Handle(GraphError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Run exceeded its {minutes} minute limit")]
    Timeout { minutes: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GroomError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidOption(_)
            | Self::Catalog(_)
            | Self::CandidateFile { .. }
            | Self::ReportUnwritable { .. }
            | Self::Handle(_) => ErrorCategory::Config,
            Self::Graph(_) | Self::Io(_) => ErrorCategory::Data,
            Self::Timeout { .. } => ErrorCategory::Timeout,
        }
    }

    pub fn exit_code(&self) -> u8 {
        exit_code(self.category())
    }
}

/// Process exit code for a failure of the given category.
pub fn exit_code(category: ErrorCategory) -> u8 {
    match category {
        ErrorCategory::Config => EXIT_CONFIG,
        ErrorCategory::Data => EXIT_DATA,
        ErrorCategory::Timeout => EXIT_TIMEOUT,
    }
}

pub type Result<T> = std::result::Result<T, GroomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_to_distinct_exit_codes() {
        let config = GroomError::InvalidOption("edges-only with skip-edge-checks".into());
        assert_eq!(config.category(), ErrorCategory::Config);
        assert_eq!(config.exit_code(), EXIT_CONFIG);

        let handle = GroomError::Handle(GraphError::Connection("refused".into()));
        assert_eq!(handle.category(), ErrorCategory::Config);

        let data = GroomError::Graph(GraphError::Query("bad row".into()));
        assert_eq!(data.exit_code(), EXIT_DATA);

        let timeout = GroomError::Timeout { minutes: 30 };
        assert_eq!(timeout.category(), ErrorCategory::Timeout);
        assert_eq!(timeout.exit_code(), EXIT_TIMEOUT);
    }
}
