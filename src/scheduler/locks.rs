//! Per-series in-process exclusion.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Set of series with a run in progress
#[derive(Debug, Default, Clone)]
pub struct SeriesLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

/// Releases the series when dropped
#[derive(Debug)]
pub struct SeriesGuard {
    held: Arc<Mutex<HashSet<String>>>,
    series_id: String,
}

/// The set stays consistent across a panicking holder, so poisoning is ignored
fn lock_held(held: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    held.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SeriesLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the series, or `None` if a run already holds it
    pub fn try_acquire(&self, series_id: &str) -> Option<SeriesGuard> {
        let mut held = lock_held(&self.held);
        if !held.insert(series_id.to_string()) {
            return None;
        }
        Some(SeriesGuard {
            held: Arc::clone(&self.held),
            series_id: series_id.to_string(),
        })
    }

    pub fn is_held(&self, series_id: &str) -> bool {
        lock_held(&self.held).contains(series_id)
    }
}

impl Drop for SeriesGuard {
    fn drop(&mut self) {
        lock_held(&self.held).remove(&self.series_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_drop() {
        let locks = SeriesLocks::new();
        let guard = locks.try_acquire("ser-1").unwrap();
        assert!(locks.try_acquire("ser-1").is_none());
        assert!(locks.is_held("ser-1"));
        drop(guard);
        assert!(!locks.is_held("ser-1"));
        assert!(locks.try_acquire("ser-1").is_some());
    }

    #[test]
    fn test_series_are_independent() {
        let locks = SeriesLocks::new();
        let _a = locks.try_acquire("ser-a").unwrap();
        assert!(locks.try_acquire("ser-b").is_some());
    }

    #[test]
    fn test_poisoned_set_still_hands_out_guards() {
        let locks = SeriesLocks::new();
        let held = Arc::clone(&locks.held);
        let _ = std::thread::spawn(move || {
            let _held = held.lock().unwrap();
            panic!("holder panicked");
        })
        .join();
        assert!(locks.held.is_poisoned());

        let guard = locks.try_acquire("ser-1").unwrap();
        assert!(locks.is_held("ser-1"));
        drop(guard);
        assert!(!locks.is_held("ser-1"));
    }
}
