//! Recurrence calculation.
//!
//! Pure functions from a [`RecurrenceSeries`](crate::domain::RecurrenceSeries)
//! and the shared [`WorkingCalendar`](crate::calendar::WorkingCalendar) to
//! occurrence timestamps:
//! - **OccurrenceIter**: lazy candidate generation with exclusion filtering
//! - **RecurrenceCalculator**: first / last / next / next-N / between queries
//! - **describe**: human-readable schedule line

mod calculator;
mod describe;
mod iter;

pub use calculator::RecurrenceCalculator;
pub use describe::describe;
pub use iter::OccurrenceIter;
