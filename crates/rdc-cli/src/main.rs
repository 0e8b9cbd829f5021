//! # rdc CLI entry point
//!
//! Parses command-line arguments, initializes tracing and dispatches to the
//! subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rdc_cli::ingest::{run_ingest, IngestArgs};
use rdc_cli::investigations::{run_investigations, InvestigationsArgs};
use rdc_cli::persons::{run_persons, PersonsArgs};
use rdc_cli::Workspace;

/// Clinical submission reconciliation.
///
/// Resolves each submission to a patient, quarantines what cannot be
/// attributed safely, and merges the rest into the patient's records.
#[derive(Parser, Debug)]
#[command(name = "rdc", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Snapshot file holding the store.
    #[arg(long, global = true, default_value = "rdc-store.json")]
    store: PathBuf,

    /// Path to the YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest parsed submission files.
    Ingest(IngestArgs),

    /// Work the investigation queue.
    Investigations(InvestigationsArgs),

    /// Administer cross-feed persons.
    Persons(PersonsArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG, when set, wins over -v.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let workspace = Workspace {
        store: cli.store,
        config: cli.config,
    };
    tracing::debug!(store = %workspace.store.display(), "rdc starting");

    let result = match &cli.command {
        Commands::Ingest(args) => run_ingest(args, &workspace),
        Commands::Investigations(args) => run_investigations(args, &workspace),
        Commands::Persons(args) => run_persons(args, &workspace),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
