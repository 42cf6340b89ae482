//! In-memory credential working set for one batch.
//!
//! Selection is random among the still-valid entries (the store hands them
//! over in LRU order; randomizing here avoids hammering one credential when
//! many workers pick at once). Persistence of invalidation is the caller's
//! decision; the pool only tracks the batch-local view.

use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};

struct PoolEntry {
    credential: String,
    invalidated: bool,
}

/// Shared, mutex-guarded credential set with an `all_failed` latch.
pub struct CredentialPool {
    entries: Mutex<Vec<PoolEntry>>,
    all_failed: AtomicBool,
}

impl CredentialPool {
    pub fn new(credentials: Vec<String>) -> Self {
        let empty = credentials.is_empty();
        Self {
            entries: Mutex::new(
                credentials
                    .into_iter()
                    .map(|credential| PoolEntry {
                        credential,
                        invalidated: false,
                    })
                    .collect(),
            ),
            all_failed: AtomicBool::new(empty),
        }
    }

    /// Random pick among non-invalidated entries; `None` once every entry
    /// has been invalidated. Callers are expected to treat `None` as the
    /// all-failed condition rather than retrying the pick.
    pub fn pick(&self) -> Option<String> {
        let entries = self.entries.lock();
        let valid: Vec<&PoolEntry> = entries.iter().filter(|e| !e.invalidated).collect();
        if valid.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..valid.len());
        Some(valid[idx].credential.clone())
    }

    /// Marks one credential invalid for the rest of the batch and
    /// recomputes the latch.
    pub fn invalidate(&self, credential: &str) {
        let mut entries = self.entries.lock();
        for entry in entries.iter_mut() {
            if entry.credential == credential {
                entry.invalidated = true;
            }
        }
        if entries.iter().all(|e| e.invalidated) {
            self.all_failed.store(true, Ordering::SeqCst);
        }
    }

    pub fn valid_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| !e.invalidated)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True iff every entry in the pool has been invalidated. Once set, the
    /// latch never clears for the lifetime of the pool.
    pub fn all_failed(&self) -> bool {
        self.all_failed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(credentials: &[&str]) -> CredentialPool {
        CredentialPool::new(credentials.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn pick_only_returns_valid_entries() {
        let pool = pool(&["t1", "t2"]);
        pool.invalidate("t1");
        for _ in 0..20 {
            assert_eq!(pool.pick().as_deref(), Some("t2"));
        }
    }

    #[test]
    fn latch_sets_when_the_last_entry_dies() {
        let pool = pool(&["t1", "t2"]);
        assert!(!pool.all_failed());
        assert_eq!(pool.valid_count(), 2);

        pool.invalidate("t1");
        assert!(!pool.all_failed());
        assert_eq!(pool.valid_count(), 1);

        pool.invalidate("t2");
        assert!(pool.all_failed());
        assert_eq!(pool.valid_count(), 0);
        assert_eq!(pool.pick(), None);
    }

    #[test]
    fn empty_pool_starts_latched() {
        let pool = CredentialPool::new(Vec::new());
        assert!(pool.all_failed());
        assert_eq!(pool.pick(), None);
        assert!(pool.is_empty());
    }

    #[test]
    fn invalidating_an_unknown_credential_is_harmless() {
        let pool = pool(&["t1"]);
        pool.invalidate("nope");
        assert!(!pool.all_failed());
        assert_eq!(pool.valid_count(), 1);
    }

    #[test]
    fn pick_covers_all_valid_entries_eventually() {
        let pool = pool(&["t1", "t2", "t3"]);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(pool.pick().unwrap());
        }
        assert_eq!(seen.len(), 3);
    }
}
