//! Storage layer for Cadence.
//!
//! This module persists series definitions and the occurrence registry in
//! SQLite. The scheduler depends only on the [`SeriesRepository`] and
//! [`OccurrenceRegistry`] traits.
//!
//! # Example
//!
//! ```ignore
//! use cadence::store::{ScheduleStore, SeriesRepository, OccurrenceRegistry};
//!
//! let store = ScheduleStore::open_at(Path::new("/var/lib/cadence"))?;
//! store.insert_series(&series)?;
//! store.upsert_occurrence(&series.id, at, None, Some(true))?; // cancel one occurrence
//! ```

mod records;
mod schedule_store;
mod traits;

pub use schedule_store::ScheduleStore;
pub use traits::{ClaimOutcome, OccurrenceRegistry, SeriesRepository};
