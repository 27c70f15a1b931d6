//! Error types for Cadence
//!
//! Centralized error handling using thiserror.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// All error types that can occur in Cadence
#[derive(Debug, Error)]
pub enum CadenceError {
    /// Series parameters violate an invariant (interval, end condition, working week)
    #[error("Invalid series configuration: {0}")]
    InvalidSeriesConfiguration(String),

    /// Series was deleted or never existed
    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    /// The materializer could not create the concrete occurrence
    #[error("Materialization failed for series {series_id} at {at}: {reason}")]
    MaterializationFailed {
        series_id: String,
        at: DateTime<Utc>,
        reason: String,
    },

    /// Occurrence operation referenced a time the series never produces
    #[error("Not an occurrence of series {series_id}: {at}")]
    UnknownOccurrence { series_id: String, at: DateTime<Utc> },

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Job queue error
    #[error("Queue error: {0}")]
    Queue(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CadenceError {
    /// Shorthand for building an `InvalidSeriesConfiguration`
    pub fn invalid(msg: impl Into<String>) -> Self {
        CadenceError::InvalidSeriesConfiguration(msg.into())
    }
}

/// Result type alias for Cadence operations
pub type Result<T> = std::result::Result<T, CadenceError>;
