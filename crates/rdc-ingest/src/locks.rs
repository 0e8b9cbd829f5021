//! # Per-Identity Locks
//!
//! Two submissions for the same patient must not resolve and merge
//! concurrently: both would see "no MRN match" and mint two pids. Every
//! ingest therefore holds a mutex for each identifier it carries (its MRN
//! within its feed and each national identifier) for the whole resolve,
//! merge and commit.
//!
//! Keys are taken in sorted order with duplicates removed, so two ingests
//! sharing any subset of identifiers cannot deadlock. An entry lives only
//! while some ingest holds or awaits it.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use rdc_core::PatientInfo;

/// Named mutexes keyed by identifier.
#[derive(Debug, Default)]
pub struct IdentityLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IdentityLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The sorted, deduplicated lock keys of a submission.
    pub fn keys_for(info: &PatientInfo) -> Vec<String> {
        let mut keys = Vec::with_capacity(1 + info.nis.len());
        keys.push(format!(
            "mrn:{}:{}:{}",
            info.feed.facility, info.feed.extract, info.mrn.value
        ));
        for ni in &info.nis {
            keys.push(format!("ni:{}:{}", ni.organization, ni.value));
        }
        keys.sort();
        keys.dedup();
        keys
    }

    /// Run `f` while holding every lock in `keys`.
    ///
    /// `keys` must be sorted and deduplicated, as [`IdentityLocks::keys_for`]
    /// returns them.
    pub fn with_locks<T>(&self, keys: &[String], f: impl FnOnce() -> T) -> T {
        let value = {
            let mutexes: Vec<Arc<Mutex<()>>> = keys
                .iter()
                .map(|key| Arc::clone(self.locks.entry(key.clone()).or_default().value()))
                .collect();
            let _guards: Vec<MutexGuard<'_, ()>> = mutexes.iter().map(|m| m.lock()).collect();
            tracing::trace!(locks = keys.len(), "identity locks held");
            f()
        };
        // A waiter holds its own clone, so only idle entries are dropped.
        for key in keys {
            self.locks.remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
        value
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no key is held or awaited.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rdc_core::{FeedScope, Identifier};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn info(nis: &[(&str, &str)]) -> PatientInfo {
        PatientInfo {
            feed: FeedScope::new("RXX", "PV"),
            channel: None,
            schema_version: None,
            birth_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            mrn: Identifier::new("123", "LOCALHOSP"),
            nis: nis.iter().map(|(v, o)| Identifier::new(*v, *o)).collect(),
        }
    }

    #[test]
    fn keys_are_sorted_and_deduplicated() {
        let keys = IdentityLocks::keys_for(&info(&[("9", "NHS"), ("1", "CHI"), ("9", "NHS")]));
        assert_eq!(
            keys,
            vec![
                "mrn:RXX:PV:123".to_string(),
                "ni:CHI:1".to_string(),
                "ni:NHS:9".to_string(),
            ]
        );
    }

    #[test]
    fn same_keys_serialize() {
        let locks = IdentityLocks::new();
        let keys = IdentityLocks::keys_for(&info(&[("9", "NHS")]));
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    locks.with_locks(&keys, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                });
            }
        });

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn released_keys_are_dropped_from_the_table() {
        let locks = IdentityLocks::new();
        for mrn in 0..100 {
            let keys = vec![format!("mrn:RXX:PV:{mrn}")];
            let held = locks.with_locks(&keys, || locks.len());
            assert_eq!(held, 1);
        }
        assert!(locks.is_empty());
    }

    #[test]
    fn returns_closure_value() {
        let locks = IdentityLocks::new();
        assert!(locks.is_empty());
        let value = locks.with_locks(&["a".to_string()], || 7);
        assert_eq!(value, 7);
    }
}
