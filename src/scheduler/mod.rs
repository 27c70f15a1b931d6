//! Occurrence scheduling.
//!
//! [`OccurrenceScheduler`] is the queued job behind every series: it turns
//! the next calculated occurrence into a concrete meeting through a
//! [`Materializer`] and re-enqueues itself.

mod locks;
mod materializer;
mod occurrence_scheduler;

pub use locks::{SeriesGuard, SeriesLocks};
pub use materializer::{JournalEntry, JournalMaterializer, MaterializeError, Materializer};
pub use occurrence_scheduler::{MaterializationOutcome, OccurrenceScheduler, RunOutcome, SchedulerConfig};
