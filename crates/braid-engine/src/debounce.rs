//! Per-key debounced actions.
//!
//! A burst of progress updates for one session should produce one derived
//! refresh, not one per event. [`DebounceTable`] keeps one pending timer per
//! key; triggering a key that already has a timer cancels it and restarts
//! the window, so the action runs once, a quiet window after the last
//! trigger.
//!
//! Timers are tokio tasks; dropping the table aborts everything pending.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

/// A scheduled timer. The generation ties the task back to its map entry
/// even if the entry has moved to another key via [`DebounceTable::rekey`].
struct PendingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// One pending debounced action per key.
pub struct DebounceTable<K> {
    window: Duration,
    next_generation: AtomicU64,
    timers: Arc<Mutex<HashMap<K, PendingTimer>>>,
}

impl<K> DebounceTable<K>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
{
    /// Create a table with the given quiet window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            next_generation: AtomicU64::new(0),
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedule `action` to run after the quiet window, superseding any
    /// pending action for the same key.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger<F, Fut>(&self, key: K, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let timers = Arc::clone(&self.timers);
        let window = self.window;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            timers.lock().retain(|_, t| t.generation != generation);
            trace!(key = ?task_key, "debounce window elapsed, running action");
            action().await;
        });
        let timer = PendingTimer { generation, handle };
        if let Some(previous) = self.timers.lock().insert(key, timer) {
            previous.handle.abort();
        }
    }

    /// Cancel the pending action for a key, if any.
    pub fn cancel(&self, key: &K) {
        if let Some(timer) = self.timers.lock().remove(key) {
            timer.handle.abort();
        }
    }

    /// Cancel every pending action.
    pub fn cancel_all(&self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.handle.abort();
        }
    }

    /// Move a pending timer from one key to another, keeping its deadline.
    ///
    /// Used when a session is renamed mid-window so a later trigger or
    /// cancel under the new key supersedes the old timer.
    pub fn rekey(&self, from: &K, to: K) {
        let mut timers = self.timers.lock();
        if let Some(timer) = timers.remove(from) {
            if let Some(previous) = timers.insert(to, timer) {
                previous.handle.abort();
            }
        }
    }

    /// Whether a timer is pending for this key.
    #[must_use]
    pub fn is_scheduled(&self, key: &K) -> bool {
        self.timers.lock().contains_key(key)
    }
}

impl<K> Drop for DebounceTable<K> {
    fn drop(&mut self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.handle.abort();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
