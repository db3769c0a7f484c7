//! Neo4j connection management and shared graph client.

use groom_core::GraphError;
use neo4rs::{ConfigBuilder, Graph, Query};

/// Errors from the bolt client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Neo4j transaction error: {0}")]
    Transaction(String),

    #[error("Row decoding error: {0}")]
    Decode(String),
}

impl From<ClientError> for GraphError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Connection(msg) => GraphError::Connection(msg),
            ClientError::Query(err) => GraphError::Query(err.to_string()),
            ClientError::Transaction(msg) => GraphError::Transaction(msg),
            ClientError::Decode(msg) => GraphError::Malformed {
                element: "row".to_string(),
                message: msg,
            },
        }
    }
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "groom-dev".to_string(),
            max_connections: 16,
            fetch_size: 512,
        }
    }
}

/// Pooled Neo4j client. Clone is cheap (inner Arc), and clones share the pool.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, ClientError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Get a reference to the underlying neo4rs Graph for direct operations.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    /// Execute a write-only query outside any explicit transaction.
    pub async fn run(&self, query: Query) -> Result<(), ClientError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, ClientError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, ClientError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Run `queries` in one explicit transaction, all or nothing.
    pub async fn run_in_txn(&self, queries: Vec<Query>) -> Result<(), ClientError> {
        if queries.is_empty() {
            return Ok(());
        }
        let count = queries.len();
        let mut txn = self.graph.start_txn().await?;
        for q in queries {
            if let Err(e) = txn.run(q).await {
                if let Err(rb) = txn.rollback().await {
                    tracing::warn!(error = %rb, "Rollback after failed statement also failed");
                }
                return Err(ClientError::Transaction(e.to_string()));
            }
        }
        txn.commit()
            .await
            .map_err(|e| ClientError::Transaction(e.to_string()))?;
        tracing::debug!(statements = count, "Transaction committed");
        Ok(())
    }
}
