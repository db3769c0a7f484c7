use thiserror::Error;

/// Errors raised by a graph store behind [`crate::access::GraphAccess`].
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Malformed {element}: {message}")]
    Malformed { element: String, message: String },
}

/// Errors raised while loading or validating a type catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Node type {0} declared more than once")]
    DuplicateType(String),

    #[error("Node type {node_type} declares {count} key properties (at most {max} supported)")]
    TooManyKeys {
        node_type: String,
        count: usize,
        max: usize,
    },

    #[error("Node type {0} declares no key properties")]
    NoKeys(String),

    #[error("Unknown node type: {0}")]
    UnknownType(String),
}

/// Triage bucket for any failure an operator may need to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Bad flags, unreadable inputs, unreachable store. Nothing was mutated.
    Config,
    /// Something in the graph could not be read or written.
    Data,
    /// The run exceeded its time budget.
    Timeout,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Data => "data",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}
