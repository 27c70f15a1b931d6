//! In-memory delayed queue with a dedup index.
//!
//! Entries are ordered by `wait_until` (ties by insertion order). Each dedup
//! key maps to at most one queued entry; the earliest requested time wins.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;

use super::job::{EnqueueOutcome, JobQueue, ScheduledRun};
use crate::error::{CadenceError, Result};

type Slot = (DateTime<Utc>, u64);

#[derive(Debug, Default)]
struct QueueState {
    by_time: BTreeMap<Slot, ScheduledRun>,
    by_key: HashMap<String, Slot>,
    seq: u64,
}

impl QueueState {
    fn insert(&mut self, run: ScheduledRun) {
        self.seq += 1;
        let slot = (run.wait_until, self.seq);
        self.by_key.insert(run.dedup_key.clone(), slot);
        self.by_time.insert(slot, run);
    }

    fn remove_key(&mut self, key: &str) -> Option<ScheduledRun> {
        let slot = self.by_key.remove(key)?;
        self.by_time.remove(&slot)
    }
}

/// Delayed job queue shared by producers and the worker
#[derive(Debug, Default)]
pub struct DelayedQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl DelayedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>> {
        self.state.lock().map_err(|e| CadenceError::Queue(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.by_time.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Earliest `wait_until` in the queue
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        let state = self.lock().ok()?;
        state.by_time.keys().next().map(|(at, _)| *at)
    }

    /// Remove and return every entry due at `now`, earliest first
    pub fn pop_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledRun>> {
        let mut state = self.lock()?;
        let mut due = Vec::new();
        while let Some(entry) = state.by_time.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let run = entry.remove();
            state.by_key.remove(&run.dedup_key);
            due.push(run);
        }
        Ok(due)
    }

    /// Snapshot of queued entries, earliest first
    pub fn pending(&self) -> Vec<ScheduledRun> {
        self.lock()
            .map(|s| s.by_time.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Queued entry for a key
    pub fn get(&self, dedup_key: &str) -> Option<ScheduledRun> {
        let state = self.lock().ok()?;
        let slot = state.by_key.get(dedup_key)?;
        state.by_time.get(slot).cloned()
    }

    /// Resolves after the next enqueue that may change the earliest due time
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

impl JobQueue for DelayedQueue {
    fn enqueue(&self, run: ScheduledRun) -> Result<EnqueueOutcome> {
        let mut state = self.lock()?;
        let outcome = match state.by_key.get(&run.dedup_key).copied() {
            Some((existing, _)) if existing <= run.wait_until => {
                return Ok(EnqueueOutcome::Deduplicated { existing });
            }
            Some((previous, _)) => {
                state.remove_key(&run.dedup_key);
                EnqueueOutcome::Rescheduled { previous }
            }
            None => EnqueueOutcome::Enqueued,
        };
        log::debug!("Queued {} at {} ({:?})", run.dedup_key, run.wait_until, outcome);
        state.insert(run);
        drop(state);
        self.notify.notify_one();
        Ok(outcome)
    }

    fn cancel(&self, dedup_key: &str) -> Result<Option<ScheduledRun>> {
        let removed = self.lock()?.remove_key(dedup_key);
        if removed.is_some() {
            self.notify.notify_one();
        }
        Ok(removed)
    }
}
