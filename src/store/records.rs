//! Row conversions between SQLite and domain records.
//!
//! Timestamps are stored as Unix milliseconds so `(series_id, start_time)`
//! compares exactly.

use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::domain::{MaterializedRef, ScheduledOccurrence};
use crate::error::{CadenceError, Result};

/// Column list matching [`OccurrenceRow::from_row`]
pub(crate) const OCCURRENCE_COLUMNS: &str =
    "series_id, start_time, materialized_ref, cancelled, claimed_at, created_at, updated_at";

/// Raw occurrence row as read from SQLite
#[derive(Debug, Clone)]
pub(crate) struct OccurrenceRow {
    pub series_id: String,
    pub start_time: i64,
    pub materialized_ref: Option<String>,
    pub cancelled: bool,
    pub claimed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl OccurrenceRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            series_id: row.get(0)?,
            start_time: row.get(1)?,
            materialized_ref: row.get(2)?,
            cancelled: row.get(3)?,
            claimed_at: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    pub fn into_occurrence(self) -> Result<ScheduledOccurrence> {
        Ok(ScheduledOccurrence {
            series_id: self.series_id,
            start_time: from_millis(self.start_time)?,
            materialized_ref: self.materialized_ref.map(MaterializedRef),
            cancelled: self.cancelled,
            claimed_at: self.claimed_at.map(from_millis).transpose()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| CadenceError::Storage(format!("timestamp out of range: {}", ms)))
}
