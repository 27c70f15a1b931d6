//! Domain types for Cadence
//!
//! - RecurrenceSeries: the recurring definition and its scheduling state
//! - ScheduledOccurrence: registry row for one nominal occurrence time
//! - MaterializedRef: weak handle to the concrete meeting

pub mod occurrence;
pub mod series;

pub use occurrence::{MaterializedRef, OccurrenceState, OccurrenceView, ScheduledOccurrence};
pub use series::{EndCondition, Frequency, RecurrenceSeries, SeriesChanges, SeriesDraft, SeriesState};
