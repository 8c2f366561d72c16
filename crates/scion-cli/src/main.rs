use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use scion_suite::{Suite, SuiteConfig};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "scion", about = "Scion extension orchestrator")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the suite, install every unit, print the report, then unload
    Run {
        /// Path to the suite config
        #[arg(long, short, default_value = "suite.toml")]
        config: PathBuf,

        /// Exit non-zero when a critical unit fails
        #[arg(long)]
        strict: bool,
    },
    /// Print the manifest in install order
    List {
        #[arg(long, short, default_value = "suite.toml")]
        config: PathBuf,
    },
}

#[derive(Serialize)]
struct ManifestRow<'a> {
    position: usize,
    id: &'a str,
    name: &'a str,
    critical: bool,
    source: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the JSON report
    let filter = EnvFilter::from_env("SCION_LOG");
    if cli.log_json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Command::Run { config, strict } => run(&config, strict).await,
        Command::List { config } => list(&config),
    }
}

async fn run(path: &Path, strict: bool) -> Result<()> {
    let config = SuiteConfig::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    let suite = Suite::from_config(&config)?;

    tracing::info!(config = %path.display(), units = config.extensions.len(), "Loading suite");

    let report = suite.onload().await;
    match &report {
        Some(report) => println!("{}", serde_json::to_string_pretty(report)?),
        None => println!(
            "{}",
            serde_json::to_string_pretty(&suite.orchestrator().log().entries())?
        ),
    }

    let teardown = suite.onunload().await;
    for warning in &teardown.warnings {
        eprintln!("warning: {warning}");
    }

    if strict && let Some(report) = &report {
        let critical: Vec<&str> = report
            .critical_failures()
            .iter()
            .map(|u| u.unit_id.as_str())
            .collect();
        if !critical.is_empty() {
            bail!("critical extensions failed: {}", critical.join(", "));
        }
    }
    Ok(())
}

fn list(path: &Path) -> Result<()> {
    let config = SuiteConfig::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    let registry = config.registry()?;

    let rows: Vec<ManifestRow<'_>> = registry
        .iter()
        .enumerate()
        .map(|(position, d)| ManifestRow {
            position,
            id: &d.id,
            name: &d.name,
            critical: d.critical,
            source: &d.source,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
