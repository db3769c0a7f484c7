//! CLI entry point for the graph grooming engine.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use groom_core::SchemaCatalog;
use groom_graph::Neo4jProvider;

use groom_engine::config::{load_engine_config, load_graph_config, EngineConfig};
use groom_engine::error::EXIT_CONFIG;
use groom_engine::{GroomError, GroomOptions, RepairGate};

#[derive(Parser)]
#[command(name = "graph-groom")]
#[command(about = "Find and repair consistency defects in a property graph")]
struct Cli {
    /// Report from an earlier run; its delete candidates authorise repairs.
    #[arg(short = 'f', long)]
    previous_report: Option<PathBuf>,

    /// Run report-only, wait, then run again using the first report.
    #[arg(long)]
    auto_fix: bool,

    /// Discard the candidate set when it holds more ids than this.
    #[arg(long)]
    max_fix: Option<usize>,

    /// Minutes to wait between the passes of --auto-fix.
    #[arg(long)]
    sleep_minutes: Option<u64>,

    /// Only check edges.
    #[arg(long)]
    edges_only: bool,

    #[arg(long)]
    skip_edge_checks: bool,

    /// Report orphans but never delete them.
    #[arg(long)]
    skip_orphan_fix: bool,

    #[arg(long)]
    skip_dupe_check: bool,

    /// Delete duplicates that are not their group's keeper.
    #[arg(long)]
    dupe_fix: bool,

    /// Skip the fresh-connection recheck of edge endpoints.
    #[arg(long)]
    skip_ghost2_check: bool,

    /// Delete endpoints only the fresh connection sees as missing.
    #[arg(long)]
    ghost2_fix: bool,

    /// Delete missing-discriminator vertices instead of repairing them.
    #[arg(long)]
    skip_index_update_fix: bool,

    /// Only scan vertices modified in the last N minutes (0 = everything).
    #[arg(long)]
    time_window_minutes: Option<u64>,

    /// Restrict the vertex scan to one node type.
    #[arg(long)]
    node_type: Option<String>,

    /// Commit after each node type.
    #[arg(long)]
    single_commits: bool,

    /// Open the primary handle on a fresh connection.
    #[arg(long)]
    never_use_cache: bool,

    /// Directory for new reports.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Directory for run audit records.
    #[arg(long)]
    audit_dir: Option<PathBuf>,

    /// Schema catalog (JSON).
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Abort the run after N minutes (0 = unbounded).
    #[arg(long)]
    max_run_minutes: Option<u64>,

    /// Config file prefix (default: groom).
    #[arg(short, long, default_value = "groom")]
    config: String,
}

impl Cli {
    fn options(&self, defaults: &EngineConfig) -> GroomOptions {
        GroomOptions {
            previous_report: self.previous_report.clone(),
            max_fix: self.max_fix.unwrap_or(defaults.max_fix),
            edges_only: self.edges_only,
            skip_edge_checks: self.skip_edge_checks,
            skip_orphan_fix: self.skip_orphan_fix,
            skip_dupe_check: self.skip_dupe_check,
            dupe_fix: self.dupe_fix,
            skip_ghost2_check: self.skip_ghost2_check,
            ghost2_fix: self.ghost2_fix,
            skip_index_update_fix: self.skip_index_update_fix,
            time_window_minutes: self
                .time_window_minutes
                .unwrap_or(defaults.time_window_minutes),
            node_type: self.node_type.clone(),
            single_commits: self.single_commits,
            never_use_cache: self.never_use_cache,
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| defaults.output_dir.clone()),
            audit_dir: self.audit_dir.clone().or_else(|| defaults.audit_dir.clone()),
            max_run_minutes: self.max_run_minutes.unwrap_or(defaults.max_run_minutes),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let code = e
                .downcast_ref::<GroomError>()
                .map(GroomError::exit_code)
                .unwrap_or(EXIT_CONFIG);
            tracing::error!(error = %e, exit_code = code, "Grooming run failed");
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let engine_config = load_engine_config(&cli.config)?;
    let graph_config = load_graph_config(&cli.config);

    if cli.auto_fix && cli.previous_report.is_some() {
        return Err(GroomError::InvalidOption(
            "--auto-fix produces its own report; drop --previous-report".to_string(),
        )
        .into());
    }

    let catalog_path = cli
        .catalog
        .clone()
        .unwrap_or_else(|| engine_config.catalog.clone());
    let catalog = SchemaCatalog::load(&catalog_path).map_err(GroomError::from)?;

    let options = cli.options(&engine_config);
    let provider = Neo4jProvider::new(graph_config);
    let gate = RepairGate::new(&provider, &catalog);

    let outcome = if cli.auto_fix {
        let minutes = cli.sleep_minutes.unwrap_or(engine_config.sleep_minutes);
        gate.run_auto_fix(&options, Duration::from_secs(minutes.saturating_mul(60)))
            .await?
    } else {
        gate.run(&options).await?
    };

    let code = outcome.exit_code();
    tracing::info!(
        report = %outcome.report_path.display(),
        findings = outcome.report.findings.len(),
        exit_code = code,
        "Grooming finished"
    );
    Ok(code)
}
