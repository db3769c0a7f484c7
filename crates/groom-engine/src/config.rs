//! Configuration for the grooming binary.

use std::path::PathBuf;

use groom_graph::GraphConfig;
use serde::Deserialize;

/// Engine defaults.
///
/// Loaded from the `[groom]` section of `groom.toml` or from `GROOM`-prefixed
/// environment variables (`__` separates nesting). Command-line flags
/// override both.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Directory new reports are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory for run audit records. No records are kept when unset.
    #[serde(default)]
    pub audit_dir: Option<PathBuf>,

    /// Path to the schema catalog (JSON).
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,

    /// Candidate sets larger than this are discarded.
    #[serde(default = "default_max_fix")]
    pub max_fix: usize,

    /// Pause between the passes of an auto-fix run.
    #[serde(default = "default_sleep_minutes")]
    pub sleep_minutes: u64,

    /// Only vertices modified within this many minutes are scanned (0 = all).
    #[serde(default)]
    pub time_window_minutes: u64,

    /// Abort a run after this many minutes (0 = unbounded).
    #[serde(default)]
    pub max_run_minutes: u64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./reports")
}

fn default_catalog() -> PathBuf {
    PathBuf::from("schema.json")
}

fn default_max_fix() -> usize {
    10
}

fn default_sleep_minutes() -> u64 {
    7
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            audit_dir: None,
            catalog: default_catalog(),
            max_fix: default_max_fix(),
            sleep_minutes: default_sleep_minutes(),
            time_window_minutes: 0,
            max_run_minutes: 0,
        }
    }
}

fn layered(file_prefix: &str) -> Result<config::Config, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("GROOM")
                .separator("__")
                .try_parsing(true),
        )
        .build()
}

/// Load the `[groom]` section. A missing section yields the defaults; a
/// malformed one is an error.
pub fn load_engine_config(file_prefix: &str) -> Result<EngineConfig, config::ConfigError> {
    let cfg = layered(file_prefix)?;
    match cfg.get::<EngineConfig>("groom") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(EngineConfig::default()),
        Err(e) => Err(e),
    }
}

/// Neo4j connection settings from the `[neo4j]` section.
pub fn load_graph_config(file_prefix: &str) -> GraphConfig {
    let defaults = GraphConfig::default();
    match layered(file_prefix) {
        Ok(c) => GraphConfig {
            uri: c.get_string("neo4j.uri").unwrap_or(defaults.uri),
            user: c.get_string("neo4j.user").unwrap_or(defaults.user),
            password: c.get_string("neo4j.password").unwrap_or(defaults.password),
            ..GraphConfig::default()
        },
        Err(e) => {
            tracing::warn!(error = %e, "Could not read Neo4j settings; using defaults");
            defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(dir: &tempfile::TempDir) -> String {
        dir.path().join("groom").display().to_string()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_engine_config(&prefix(&dir)).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_fix, 10);
        assert_eq!(config.sleep_minutes, 7);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("groom.toml"),
            "[groom]\nmax_fix = 50\naudit_dir = \"/var/groom/audit\"\n\n\
             [neo4j]\nuri = \"bolt://graph:7687\"\n",
        )
        .unwrap();

        let config = load_engine_config(&prefix(&dir)).unwrap();
        assert_eq!(config.max_fix, 50);
        assert_eq!(config.audit_dir, Some(PathBuf::from("/var/groom/audit")));
        assert_eq!(config.sleep_minutes, 7);

        let graph = load_graph_config(&prefix(&dir));
        assert_eq!(graph.uri, "bolt://graph:7687");
        assert_eq!(graph.user, "neo4j");
    }

    #[test]
    fn malformed_section_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("groom.toml"), "[groom]\nmax_fix = \"lots\"\n").unwrap();
        assert!(load_engine_config(&prefix(&dir)).is_err());
    }
}
