//! Scheduled occurrence records
//!
//! One row per nominal occurrence time the scheduler has looked at. Rows are
//! created lazily, linked to the concrete meeting once it exists, and kept as
//! tombstones when cancelled.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque handle to the concrete occurrence owned by the materializer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterializedRef(pub String);

impl MaterializedRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MaterializedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A nominal point in time the series is expected to produce an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledOccurrence {
    pub series_id: String,
    /// Calculator-predicted time; any user-adjusted time lives on the concrete object
    pub start_time: DateTime<Utc>,
    pub materialized_ref: Option<MaterializedRef>,
    pub cancelled: bool,
    /// Set while a worker is materializing this occurrence
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ScheduledOccurrence {
    pub fn is_materialized(&self) -> bool {
        self.materialized_ref.is_some()
    }

    pub fn state(&self) -> OccurrenceState {
        if self.cancelled {
            OccurrenceState::Cancelled
        } else if let Some(r) = &self.materialized_ref {
            OccurrenceState::Materialized(r.clone())
        } else {
            OccurrenceState::Pending
        }
    }
}

/// What a caller sees for one upcoming occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "ref")]
pub enum OccurrenceState {
    /// Not materialized yet
    Pending,
    Materialized(MaterializedRef),
    Cancelled,
}

impl fmt::Display for OccurrenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OccurrenceState::Pending => f.write_str("pending"),
            OccurrenceState::Materialized(r) => write!(f, "created ({})", r),
            OccurrenceState::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Calculated occurrence merged with registry state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceView {
    pub start_time: DateTime<Utc>,
    pub state: OccurrenceState,
}
