//! Per-employee cooldown after a confirmed attendance mark.
//!
//! An id is inserted on its first confirmation and removed by a one-shot
//! timer once the window elapses. Nothing else mutates the set.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Default suppression window after a confirmation.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(30_000);

/// Clone-safe handle to the set of recently confirmed employee ids.
#[derive(Debug, Clone)]
pub struct CooldownRegistry {
    entries: Arc<Mutex<HashSet<String>>>,
    window: Duration,
}

impl Default for CooldownRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl CooldownRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashSet::new())),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True while `emp_id` is inside its cooldown window.
    pub fn is_suppressed(&self, emp_id: &str) -> bool {
        lock(&self.entries).contains(emp_id)
    }

    /// Record a confirmation and schedule its expiry.
    ///
    /// Returns `false` (and leaves the existing timer alone) if `emp_id` is
    /// already suppressed: the first confirmation governs expiry.
    /// Must be called from within a Tokio runtime.
    pub fn confirm(&self, emp_id: &str) -> bool {
        if !lock(&self.entries).insert(emp_id.to_string()) {
            return false;
        }

        let entries = Arc::clone(&self.entries);
        let window = self.window;
        let emp_id = emp_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            lock(&entries).remove(&emp_id);
            tracing::debug!(emp_id = %emp_id, "cooldown expired");
        });
        true
    }

    /// Number of ids currently suppressed.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock(entries: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
