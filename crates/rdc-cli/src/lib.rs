//! # rdc-cli — Reconciliation Command Line
//!
//! Provides the `rdc` binary over a [`MemoryRepository`] persisted as a JSON
//! snapshot between invocations.
//!
//! ## Subcommands
//!
//! - `rdc ingest <files>` — ingest parsed submissions (JSON documents).
//! - `rdc investigations list|show|resolve|reprocess` — work the queue.
//! - `rdc persons merge|split|override` — administer cross-feed persons.
//!
//! ```bash
//! rdc --store state.json --config rdc.yaml ingest inbox/*.json
//! rdc --store state.json investigations list
//! rdc --store state.json investigations reprocess 5f0c...
//! ```
//!
//! Handlers return the process exit code: 0 on success, 2 when some input
//! was rejected or failed. Infrastructure errors surface as `Err`.

pub mod ingest;
pub mod investigations;
pub mod persons;

use std::path::PathBuf;

use anyhow::{Context, Result};
use rdc_ingest::{IngestConfig, Ingestor};
use rdc_store::MemoryRepository;

/// Where the store lives and how the stack is configured.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Snapshot file backing the store.
    pub store: PathBuf,
    /// Optional YAML configuration.
    pub config: Option<PathBuf>,
}

impl Workspace {
    /// Load the snapshot and configuration and build an orchestrator.
    pub fn open(&self) -> Result<Ingestor<MemoryRepository>> {
        let config = match &self.config {
            Some(path) => IngestConfig::load(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => IngestConfig::default(),
        };
        let repo = MemoryRepository::load(&self.store)
            .with_context(|| format!("loading store {}", self.store.display()))?;
        Ok(Ingestor::new(repo, &config)?)
    }

    /// Persist the committed contents of the store.
    pub fn save(&self, ingestor: &Ingestor<MemoryRepository>) -> Result<()> {
        ingestor
            .store()
            .save(&self.store)
            .with_context(|| format!("writing store {}", self.store.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace {
            store: dir.path().join("store.json"),
            config: None,
        };
        let ingestor = workspace.open().unwrap();
        assert_eq!(ingestor.store().snapshot().total_records(), 0);
        workspace.save(&ingestor).unwrap();
        assert!(workspace.store.exists());
    }

    #[test]
    fn open_reports_bad_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("rdc.yaml");
        std::fs::write(&config, "reference_utc_offset_secs: [").unwrap();
        let workspace = Workspace {
            store: dir.path().join("store.json"),
            config: Some(config),
        };
        let err = workspace.open().unwrap_err();
        assert!(format!("{err:#}").contains("loading configuration"));
    }
}
