//! Job records and the narrow scheduling primitive the engine depends on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::id::{generate_job_id, occurrence_dedup_key};

/// What a queued job does when it becomes due
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JobKind {
    /// Materialize the next occurrence of a series and reschedule
    InitNextOccurrence { series_id: String },
}

/// One delayed invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledRun {
    pub id: String,
    pub kind: JobKind,
    /// Not executed before this instant
    pub wait_until: DateTime<Utc>,
    /// At most one queued job per key
    pub dedup_key: String,
}

impl ScheduledRun {
    pub fn init_next_occurrence(series_id: &str, wait_until: DateTime<Utc>) -> Self {
        Self {
            id: generate_job_id(series_id),
            kind: JobKind::InitNextOccurrence {
                series_id: series_id.to_string(),
            },
            wait_until,
            dedup_key: occurrence_dedup_key(series_id),
        }
    }
}

/// Result of an enqueue request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// New entry queued
    Enqueued,
    /// An entry with the same key was queued later; it was moved up
    Rescheduled { previous: DateTime<Utc> },
    /// An entry with the same key is already queued at or before this time
    Deduplicated { existing: DateTime<Utc> },
}

impl EnqueueOutcome {
    /// When the surviving entry for the key will run
    pub fn effective_time(&self, requested: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            EnqueueOutcome::Deduplicated { existing } => *existing,
            _ => requested,
        }
    }
}

/// Delayed, deduplicated, at-least-once execution
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, run: ScheduledRun) -> Result<EnqueueOutcome>;

    /// Drop the queued entry for `dedup_key`, if any
    fn cancel(&self, dedup_key: &str) -> Result<Option<ScheduledRun>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_init_next_occurrence_job() {
        let at = Utc.with_ymd_and_hms(2025, 1, 7, 9, 0, 0).unwrap();
        let run = ScheduledRun::init_next_occurrence("ser-1", at);
        assert_eq!(run.wait_until, at);
        assert_eq!(run.dedup_key, "init-next-occurrence:ser-1");
        assert_eq!(
            run.kind,
            JobKind::InitNextOccurrence {
                series_id: "ser-1".to_string()
            }
        );
    }

    #[test]
    fn test_effective_time() {
        let a = Utc.with_ymd_and_hms(2025, 1, 7, 9, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 1, 8, 9, 0, 0).unwrap();
        assert_eq!(EnqueueOutcome::Enqueued.effective_time(b), b);
        assert_eq!(EnqueueOutcome::Deduplicated { existing: a }.effective_time(b), a);
    }
}
