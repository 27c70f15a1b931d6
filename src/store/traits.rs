//! Storage trait definitions.
//!
//! The scheduler only sees these seams; [`ScheduleStore`](super::ScheduleStore)
//! is the SQLite implementation.

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::{MaterializedRef, RecurrenceSeries, ScheduledOccurrence, SeriesState};
use crate::error::Result;

/// Result of trying to take ownership of one occurrence for materialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Caller owns the occurrence and must complete or release it
    Claimed,
    /// Concrete occurrence already exists
    AlreadyMaterialized(MaterializedRef),
    /// Tombstoned; never materialize
    Cancelled,
    /// Another worker holds a live claim
    InFlight { claimed_at: DateTime<Utc> },
}

/// Persistence for series definitions and their scheduling state
pub trait SeriesRepository: Send + Sync {
    fn insert_series(&self, series: &RecurrenceSeries) -> Result<()>;

    fn get_series(&self, id: &str) -> Result<Option<RecurrenceSeries>>;

    /// Replace an existing series; `SeriesNotFound` if it is gone
    fn update_series(&self, series: &RecurrenceSeries) -> Result<()>;

    /// Delete a series and every occurrence row it owns. Returns false if absent.
    fn delete_series(&self, id: &str) -> Result<bool>;

    fn list_series(&self) -> Result<Vec<RecurrenceSeries>>;

    /// Record a state transition; `SeriesNotFound` if the series is gone
    fn set_state(&self, id: &str, state: SeriesState, next_run_at: Option<DateTime<Utc>>) -> Result<()>;
}

/// Tracks cancelled and materialized occurrences per series
pub trait OccurrenceRegistry: Send + Sync {
    fn find_occurrence(&self, series_id: &str, at: DateTime<Utc>) -> Result<Option<ScheduledOccurrence>>;

    /// Create or update the row for `(series_id, at)`; `None` fields keep their value
    fn upsert_occurrence(
        &self,
        series_id: &str,
        at: DateTime<Utc>,
        materialized_ref: Option<MaterializedRef>,
        cancelled: Option<bool>,
    ) -> Result<ScheduledOccurrence>;

    /// Atomic check-then-act: inspect the row and claim it if it is free.
    ///
    /// Claims older than `claim_ttl` are treated as abandoned.
    fn claim_occurrence(
        &self,
        series_id: &str,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
        claim_ttl: TimeDelta,
    ) -> Result<ClaimOutcome>;

    /// Link the concrete occurrence and drop the claim
    fn complete_occurrence(&self, series_id: &str, at: DateTime<Utc>, materialized_ref: &MaterializedRef) -> Result<()>;

    /// Drop the claim without materializing; the row stays
    fn release_occurrence(&self, series_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// All rows of a series, ordered by start time
    fn list_occurrences(&self, series_id: &str) -> Result<Vec<ScheduledOccurrence>>;
}
