//! # Persons Subcommand
//!
//! Administrative changes to cross-feed person membership and to the
//! matching rules of a single pid.

use anyhow::Result;
use clap::{Args, Subcommand};
use rdc_core::{PersonId, Pid};
use rdc_store::Transaction;

use crate::Workspace;

/// Arguments for `rdc persons`.
#[derive(Args, Debug)]
pub struct PersonsArgs {
    #[command(subcommand)]
    pub command: PersonsCommand,
}

/// Person administration operations.
#[derive(Subcommand, Debug)]
pub enum PersonsCommand {
    /// Move every pid of one person to another.
    Merge {
        /// Person id to dissolve.
        from: String,
        /// Person id to keep.
        into: String,
    },

    /// Give a pid a freshly minted person id of its own.
    Split {
        /// Pid to detach.
        pid: String,
    },

    /// Allow a pid's national identifiers to disagree with its MRN match.
    Override {
        /// Pid the override applies to.
        pid: String,

        /// Why the disagreement is acceptable.
        #[arg(long)]
        reason: String,
    },
}

/// Execute the persons subcommand.
pub fn run_persons(args: &PersonsArgs, workspace: &Workspace) -> Result<u8> {
    let ingestor = workspace.open()?;
    let resolver = ingestor.resolver();
    let mut tx = ingestor.store().begin();

    let message = match &args.command {
        PersonsCommand::Merge { from, into } => {
            let moved = resolver.merge_persons(&mut tx, &PersonId::new(from), &PersonId::new(into))?;
            format!("moved {} pid(s) from person {from} to person {into}", moved.len())
        }
        PersonsCommand::Split { pid } => {
            let person = resolver.split_person(&mut tx, &Pid::new(pid))?;
            format!("pid {pid} is now person {person}")
        }
        PersonsCommand::Override { pid, reason } => {
            resolver.record_override(&mut tx, &Pid::new(pid), reason)?;
            format!("override recorded for pid {pid}")
        }
    };

    tx.commit()?;
    workspace.save(&ingestor)?;
    println!("{message}");
    Ok(0)
}
