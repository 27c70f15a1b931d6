//! Caller-facing operations on series and startup recovery.

mod recovery;
mod series_service;

pub use recovery::{Recovery, RecoveryAction};
pub use series_service::SeriesService;
