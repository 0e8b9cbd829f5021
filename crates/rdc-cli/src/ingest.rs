//! # Ingest Subcommand
//!
//! Reads parsed submissions (JSON-serialized [`IncomingDocument`]s) and
//! ingests each in turn. One line is printed per file. A file that cannot be
//! read, parsed or ingested is reported and skipped; the rest still run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use rdc_ingest::{IngestOutcome, Ingestor};
use rdc_merge::IncomingDocument;
use rdc_store::MemoryRepository;

use crate::Workspace;

/// Arguments for `rdc ingest`.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Submission files to ingest, in order.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Execute the ingest subcommand.
pub fn run_ingest(args: &IngestArgs, workspace: &Workspace) -> Result<u8> {
    let ingestor = workspace.open()?;
    let mut failures = 0usize;

    for path in &args.files {
        match ingest_file(&ingestor, path) {
            Ok(outcome) => println!("{}", describe(&path.display().to_string(), &outcome)),
            Err(e) => {
                failures += 1;
                println!("failed       {}: {e:#}", path.display());
            }
        }
    }

    workspace.save(&ingestor)?;
    tracing::info!(files = args.files.len(), failures, "ingest run complete");
    Ok(if failures == 0 { 0 } else { 2 })
}

fn ingest_file(ingestor: &Ingestor<MemoryRepository>, path: &Path) -> Result<IngestOutcome> {
    let bytes = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let document: IncomingDocument =
        serde_json::from_slice(&bytes).context("not a parsed submission")?;
    let filename = path.file_name().and_then(|n| n.to_str());
    Ok(ingestor.ingest(&document, filename)?)
}

/// One-line summary of an outcome.
pub fn describe(label: &str, outcome: &IngestOutcome) -> String {
    match outcome {
        IngestOutcome::Merged {
            pid,
            person_id,
            new_patient,
            deltas,
            flagged,
            ..
        } => {
            let mut line = format!(
                "merged       {label} pid={pid} person={person_id}{} {}",
                if *new_patient { " (new)" } else { "" },
                deltas.counts()
            );
            if let Some(flag) = flagged {
                line.push_str(&format!(" flagged={flag}"));
            }
            line
        }
        IngestOutcome::Quarantined { investigation } => {
            format!("quarantined  {label} investigation={investigation}")
        }
    }
}
