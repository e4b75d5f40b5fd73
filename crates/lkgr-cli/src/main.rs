//! LKGR - last-known-good-revision resolution
//!
//! The `lkgr` command resolves and publishes the newest revision every
//! configured CI builder has proven green.
//!
//! ## Commands
//!
//! - `run`: Execute one full resolution run (fetch, scan, publish or alert)
//! - `check`: Evaluate staleness of the published LKGR without fetching
//! - `resolve`: Map a single revision to its linear position

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

use lkgr_engine::{
    evaluate, init_tracing, BuildDataSource, FilePublisher, GitRevisionLog, HttpBuildFetcher,
    LkgrConfig, LkgrPipeline, RevisionOracle,
};

#[derive(Parser)]
#[command(name = "lkgr")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Last-known-good-revision resolution for CI fleets", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted output and log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one full resolution run
    Run {
        /// Path to the deployment configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Republish the found candidate even when it does not advance
        #[arg(long)]
        force: bool,

        /// Decide but skip publishing and alerting
        #[arg(long)]
        dry_run: bool,
    },

    /// Evaluate staleness of the published LKGR without fetching builders
    Check {
        /// Path to the deployment configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Map a revision to its linear position
    Resolve {
        /// Path to the deployment configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Revision identifier to resolve
        revision: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            config,
            force,
            dry_run,
        } => cmd_run(&config, force, dry_run, cli.json).await,
        Commands::Check { config } => cmd_check(&config, cli.json),
        Commands::Resolve { config, revision } => cmd_resolve(&config, &revision),
    }
}

fn load_oracle(config: &LkgrConfig) -> RevisionOracle {
    RevisionOracle::new(Box::new(GitRevisionLog::new(&config.repo_dir)))
        .with_overrides(config.position_overrides.clone())
}

fn read_current_lkgr(config: &LkgrConfig) -> Result<String> {
    let raw = std::fs::read_to_string(&config.lkgr_file).with_context(|| {
        format!(
            "cannot read published LKGR from {}",
            config.lkgr_file.display()
        )
    })?;
    let revision = raw.trim().to_string();
    anyhow::ensure!(
        !revision.is_empty(),
        "LKGR file {} is empty",
        config.lkgr_file.display()
    );
    Ok(revision)
}

async fn cmd_run(config_path: &Path, force: bool, dry_run: bool, json: bool) -> Result<()> {
    let config = LkgrConfig::from_file(config_path)?;
    let current_lkgr = read_current_lkgr(&config)?;
    let mut oracle = load_oracle(&config);

    let fetcher = Arc::new(HttpBuildFetcher::new(config.fetch_limit)?);
    let source = BuildDataSource::new(fetcher, config.max_parallelism);
    let publisher = Arc::new(FilePublisher::new(&config.lkgr_file));

    let pipeline = LkgrPipeline::new(
        source,
        publisher,
        config.builder_specs(),
        config.green_policy,
        config.thresholds(),
    )
    .dry_run(dry_run);

    let outcome = pipeline
        .run(&mut oracle, &current_lkgr, &config.head_ref, force)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("run {} finished in {}ms", outcome.run_id, outcome.duration_ms);
        println!("{:?}", outcome.decision);
    }
    Ok(())
}

fn cmd_check(config_path: &Path, json: bool) -> Result<()> {
    let config = LkgrConfig::from_file(config_path)?;
    let current_lkgr = read_current_lkgr(&config)?;
    let mut oracle = load_oracle(&config);

    let decision = evaluate(
        None,
        &current_lkgr,
        &config.head_ref,
        &mut oracle,
        &config.thresholds(),
        false,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        println!("{decision:?}");
    }
    Ok(())
}

fn cmd_resolve(config_path: &Path, revision: &str) -> Result<()> {
    let config = LkgrConfig::from_file(config_path)?;
    let mut oracle = load_oracle(&config);

    let position = oracle.resolve(revision)?;
    println!("{revision} -> {position}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from([
            "lkgr", "run", "--config", "/tmp/lkgr.json", "--force", "--dry-run",
        ]);
        match cli.command {
            Commands::Run {
                force, dry_run, ..
            } => {
                assert!(force);
                assert!(dry_run);
            }
            _ => panic!("expected run"),
        }
    }
}
