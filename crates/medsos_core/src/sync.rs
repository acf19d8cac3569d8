//! Per-key mutual exclusion.
//!
//! # Responsibility
//! - Serialize critical sections that share a key (request id, requester id).
//! - Let unrelated keys proceed in parallel.
//!
//! # Invariants
//! - At most one closure runs per key at a time.
//! - Idle slots are pruned, so the table only holds keys in use.
//! - Lock poisoning is recovered; callers never observe a poisoned slot.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Table of lazily created per-key mutexes.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `key`.
    pub fn with_lock<T>(&self, key: &K, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = lock_ignoring_poison(&self.slots);
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let output = {
            let _guard = lock_ignoring_poison(&slot);
            f()
        };

        let mut slots = lock_ignoring_poison(&self.slots);
        // Table entry plus our handle: nobody else is waiting on this key.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }

        output
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        lock_ignoring_poison(&self.slots).len()
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
