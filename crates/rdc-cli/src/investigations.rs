//! # Investigations Subcommand
//!
//! List, inspect and resolve investigations, and reprocess the documents
//! they hold.

use anyhow::Result;
use clap::{Args, Subcommand};
use rdc_core::InvestigationId;
use rdc_investigate::Investigation;
use rdc_store::{IssueRepository, Transaction};

use crate::ingest::describe;
use crate::Workspace;

/// Arguments for `rdc investigations`.
#[derive(Args, Debug)]
pub struct InvestigationsArgs {
    #[command(subcommand)]
    pub command: InvestigationsCommand,
}

/// Investigation operations.
#[derive(Subcommand, Debug)]
pub enum InvestigationsCommand {
    /// List investigations, open ones only unless `--all` is given.
    List {
        /// Include resolved investigations.
        #[arg(long)]
        all: bool,
    },

    /// Print one investigation as JSON.
    Show {
        /// Investigation id.
        id: InvestigationId,
    },

    /// Mark an investigation resolved.
    Resolve {
        /// Investigation id.
        id: InvestigationId,

        /// Free-text resolution note.
        #[arg(long)]
        note: Option<String>,
    },

    /// Resolve an investigation and re-ingest the document it holds.
    Reprocess {
        /// Investigation id.
        id: InvestigationId,
    },
}

/// Execute the investigations subcommand.
pub fn run_investigations(args: &InvestigationsArgs, workspace: &Workspace) -> Result<u8> {
    let ingestor = workspace.open()?;
    let service = ingestor.investigations();

    match &args.command {
        InvestigationsCommand::List { all } => {
            let tx = ingestor.store().begin();
            let listed: Vec<Investigation> = if *all {
                let mut every = Vec::new();
                for row in tx.list_issues()? {
                    every.push(service.require(&tx, &row.id)?);
                }
                every
            } else {
                service.list_open(&tx)?
            };
            for investigation in &listed {
                println!("{}", summary(investigation));
            }
            println!("{} investigation(s)", listed.len());
            Ok(0)
        }
        InvestigationsCommand::Show { id } => {
            let tx = ingestor.store().begin();
            let investigation = service.require(&tx, id)?;
            println!("{}", serde_json::to_string_pretty(&investigation)?);
            Ok(0)
        }
        InvestigationsCommand::Resolve { id, note } => {
            let mut tx = ingestor.store().begin();
            let investigation = service.resolve(&mut tx, id, note.as_deref())?;
            tx.commit()?;
            workspace.save(&ingestor)?;
            println!("resolved     {}", summary(&investigation));
            Ok(0)
        }
        InvestigationsCommand::Reprocess { id } => {
            let outcome = ingestor.reprocess(id)?;
            workspace.save(&ingestor)?;
            println!("{}", describe(&id.to_string(), &outcome));
            Ok(0)
        }
    }
}

fn summary(investigation: &Investigation) -> String {
    let identities: Vec<String> = investigation
        .identities
        .iter()
        .map(ToString::to_string)
        .collect();
    format!(
        "{} {}{} [{}] {}",
        investigation,
        if investigation.blocking { "blocking" } else { "advisory" },
        if investigation.resolved { " resolved" } else { "" },
        identities.join(", "),
        investigation.message
    )
}
