//! Cadence - Recurring occurrence scheduling engine
//!
//! Cadence expands recurrence rules (daily, working days, weekly) into
//! concrete occurrence times against a working calendar, and keeps a
//! self-rescheduling background job per series that materializes each
//! occurrence exactly once before it starts.

pub mod calendar;
pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod id;
pub mod queue;
pub mod recurrence;
pub mod scheduler;
pub mod service;
pub mod store;

pub use engine::Engine;
pub use error::{CadenceError, Result};
