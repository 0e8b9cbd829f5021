//! # Snapshot Files
//!
//! Persist the committed contents of a [`MemoryRepository`] as a JSON file and
//! load them back. Writes go to a sibling temporary file that is renamed over
//! the target, so a crash mid-write never leaves a truncated snapshot.

use std::fs;
use std::path::Path;

use crate::error::StoreError;
use crate::memory::{MemoryRepository, StoreState};

impl MemoryRepository {
    /// Load a store from a snapshot file. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "snapshot not found; starting empty");
            return Ok(Self::new());
        }
        let bytes = fs::read(path)?;
        let state: StoreState = serde_json::from_slice(&bytes)?;
        tracing::debug!(
            path = %path.display(),
            records = state.total_records(),
            "snapshot loaded"
        );
        Ok(Self::from_state(state))
    }

    /// Write the committed contents to a snapshot file.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let state = self.snapshot();
        let bytes = serde_json::to_vec_pretty(&state)?;
        let tmp = path.with_extension("tmp");
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), "snapshot written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::traits::{RecordRepository, Transaction};
    use rdc_core::{NaturalKey, Pid, Timestamp};

    #[test]
    fn save_then_load_preserves_records_and_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let repo = MemoryRepository::new();
        let mut tx = repo.begin();
        let pid = Pid::new("1000000001");
        tx.add(Record::new(
            "patient",
            NaturalKey::root(&pid),
            None,
            pid.clone(),
            Timestamp::now(),
        ))
        .unwrap();
        tx.commit().unwrap();
        let mut tx = repo.begin();
        let _ = mint_pid_string(&mut tx);
        tx.rollback();
        repo.save(&path).unwrap();

        let loaded = MemoryRepository::load(&path).unwrap();
        assert_eq!(loaded.snapshot().record_count("patient"), 1);
        let mut tx = loaded.begin();
        assert_eq!(mint_pid_string(&mut tx), "1000000002");
    }

    fn mint_pid_string(tx: &mut crate::memory::MemoryTransaction) -> String {
        use crate::traits::IdentityRepository;
        tx.mint_pid().unwrap().to_string()
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(repo.snapshot().total_records(), 0);
    }
}
