//! Recurrence series and related types
//!
//! A series is the recurring definition: an anchor time, a frequency with an
//! interval, and an end condition. The scheduler derives every occurrence from
//! it; nothing here knows about concrete meetings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};
use crate::id::{generate_series_id, now_ms};

/// How the series steps from one occurrence to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Every `interval` calendar days
    Daily,
    /// Every `interval` working weekdays
    WorkingDays,
    /// Every `interval` weeks, same weekday as the anchor
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::WorkingDays => "working_days",
            Frequency::Weekly => "weekly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "daily" => Ok(Frequency::Daily),
            "working_days" | "workdays" => Ok(Frequency::WorkingDays),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(CadenceError::invalid(format!("unknown frequency: {}", other))),
        }
    }
}

/// When the series stops producing occurrences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndCondition {
    /// Last occurrence falls on or before this local date
    SpecificDate(NaiveDate),
    /// Exactly this many (non-excluded) occurrences
    IterationCount(u32),
}

/// Scheduling state of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesState {
    /// No run queued
    Idle,
    /// A run is queued for `next_run_at`
    Scheduled,
    /// A run is materializing an occurrence
    Running,
    /// No further occurrences; terminal
    Completed,
}

impl SeriesState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesState::Idle => "idle",
            SeriesState::Scheduled => "scheduled",
            SeriesState::Running => "running",
            SeriesState::Completed => "completed",
        }
    }

    /// Returns true if the series will never run again
    pub fn is_terminal(&self) -> bool {
        matches!(self, SeriesState::Completed)
    }
}

impl FromStr for SeriesState {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(SeriesState::Idle),
            "scheduled" => Ok(SeriesState::Scheduled),
            "running" => Ok(SeriesState::Running),
            "completed" => Ok(SeriesState::Completed),
            other => Err(CadenceError::Storage(format!("unknown series state: {}", other))),
        }
    }
}

/// The recurring definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceSeries {
    //=== Identity ===
    pub id: String,
    pub title: String,

    //=== Recurrence rule ===
    /// First occurrence, always part of the series as-is
    pub start_time: DateTime<Utc>,
    /// Zone whose wall clock the rule steps in
    pub time_zone: Tz,
    pub frequency: Frequency,
    pub interval: u32,
    pub end_condition: EndCondition,

    //=== Scheduling ===
    pub state: SeriesState,
    pub next_run_at: Option<DateTime<Utc>>,

    //=== Timestamps ===
    pub created_at: i64,
    pub updated_at: i64,
}

impl RecurrenceSeries {
    /// Start building a series anchored at `start_time`
    pub fn draft(title: impl Into<String>, start_time: DateTime<Utc>, frequency: Frequency) -> SeriesDraft {
        SeriesDraft {
            title: title.into(),
            start_time,
            time_zone: Tz::UTC,
            frequency,
            interval: 1,
            end_condition: EndCondition::IterationCount(1),
        }
    }

    /// Anchor in the series' own zone
    pub fn local_start(&self) -> DateTime<Tz> {
        self.start_time.with_timezone(&self.time_zone)
    }

    /// Check every invariant of the recurrence rule
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(CadenceError::invalid("title must not be empty"));
        }
        if self.interval < 1 {
            return Err(CadenceError::invalid("interval must be >= 1"));
        }
        match self.end_condition {
            EndCondition::IterationCount(n) if n < 1 => {
                Err(CadenceError::invalid("iteration count must be >= 1"))
            }
            EndCondition::SpecificDate(date) if date < self.local_start().date_naive() => Err(
                CadenceError::invalid(format!("end date {} is before the start date", date)),
            ),
            _ => Ok(()),
        }
    }

    /// Apply an edit; the series is left untouched when the result is invalid.
    pub fn apply(&mut self, changes: &SeriesChanges) -> Result<()> {
        let mut edited = self.clone();
        if let Some(title) = &changes.title {
            edited.title = title.clone();
        }
        if let Some(frequency) = changes.frequency {
            edited.frequency = frequency;
        }
        if let Some(interval) = changes.interval {
            edited.interval = interval;
        }
        if let Some(end_condition) = changes.end_condition {
            edited.end_condition = end_condition;
        }
        edited.validate()?;
        edited.updated_at = now_ms();
        *self = edited;
        Ok(())
    }
}

/// Unvalidated series parameters
#[derive(Debug, Clone)]
pub struct SeriesDraft {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub time_zone: Tz,
    pub frequency: Frequency,
    pub interval: u32,
    pub end_condition: EndCondition,
}

impl SeriesDraft {
    /// Anchor given as wall-clock time in `tz`
    pub fn local(
        title: impl Into<String>,
        tz: Tz,
        start: chrono::NaiveDateTime,
        frequency: Frequency,
    ) -> Result<Self> {
        let start_time = tz
            .from_local_datetime(&start)
            .earliest()
            .ok_or_else(|| CadenceError::invalid(format!("{} does not exist in {}", start, tz)))?
            .with_timezone(&Utc);
        Ok(RecurrenceSeries::draft(title, start_time, frequency).in_time_zone(tz))
    }

    pub fn every(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.end_condition = EndCondition::SpecificDate(date);
        self
    }

    pub fn times(mut self, iterations: u32) -> Self {
        self.end_condition = EndCondition::IterationCount(iterations);
        self
    }

    pub fn in_time_zone(mut self, tz: Tz) -> Self {
        self.time_zone = tz;
        self
    }

    /// Validate and assign an id
    pub fn build(self) -> Result<RecurrenceSeries> {
        let now = now_ms();
        let series = RecurrenceSeries {
            id: generate_series_id(),
            title: self.title,
            start_time: self.start_time,
            time_zone: self.time_zone,
            frequency: self.frequency,
            interval: self.interval,
            end_condition: self.end_condition,
            state: SeriesState::Idle,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        };
        series.validate()?;
        Ok(series)
    }
}

/// Editable fields of a series; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct SeriesChanges {
    pub title: Option<String>,
    pub frequency: Option<Frequency>,
    pub interval: Option<u32>,
    pub end_condition: Option<EndCondition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 31, 13, 30, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_draft_defaults() {
        let series = RecurrenceSeries::draft("Standup", start(), Frequency::Daily)
            .build()
            .unwrap();
        assert_eq!(series.interval, 1);
        assert_eq!(series.end_condition, EndCondition::IterationCount(1));
        assert_eq!(series.time_zone, Tz::UTC);
        assert_eq!(series.state, SeriesState::Idle);
        assert!(series.id.starts_with("ser-"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = RecurrenceSeries::draft("Standup", start(), Frequency::Daily)
            .every(0)
            .times(3)
            .build()
            .unwrap_err();
        assert!(matches!(err, CadenceError::InvalidSeriesConfiguration(_)));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let err = RecurrenceSeries::draft("Standup", start(), Frequency::Daily)
            .times(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("iteration count"));
    }

    #[test]
    fn test_end_date_before_start_rejected() {
        let err = RecurrenceSeries::draft("Standup", start(), Frequency::Weekly)
            .until(date(2024, 12, 30))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("before the start date"));
    }

    #[test]
    fn test_end_date_on_start_date_allowed() {
        let series = RecurrenceSeries::draft("Standup", start(), Frequency::Weekly)
            .until(date(2024, 12, 31))
            .build();
        assert!(series.is_ok());
    }

    #[test]
    fn test_end_date_compared_in_local_zone() {
        // 23:30 UTC on Dec 31 is already Jan 1 in Berlin
        let late = Utc.with_ymd_and_hms(2024, 12, 31, 23, 30, 0).unwrap();
        let err = RecurrenceSeries::draft("Late", late, Frequency::Daily)
            .in_time_zone(chrono_tz::Europe::Berlin)
            .until(date(2024, 12, 31))
            .build()
            .unwrap_err();
        assert!(matches!(err, CadenceError::InvalidSeriesConfiguration(_)));
    }

    #[test]
    fn test_local_draft_converts_to_utc() {
        let naive = NaiveDateTime::parse_from_str("2025-01-07 09:00", "%Y-%m-%d %H:%M").unwrap();
        let draft = SeriesDraft::local("Sync", chrono_tz::Europe::Berlin, naive, Frequency::Weekly).unwrap();
        assert_eq!(draft.start_time, Utc.with_ymd_and_hms(2025, 1, 7, 8, 0, 0).unwrap());
        assert_eq!(draft.time_zone, chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_apply_keeps_series_on_invalid_edit() {
        let mut series = RecurrenceSeries::draft("Standup", start(), Frequency::Daily)
            .times(5)
            .build()
            .unwrap();
        let before = series.clone();
        let changes = SeriesChanges {
            interval: Some(0),
            ..Default::default()
        };
        assert!(series.apply(&changes).is_err());
        assert_eq!(series, before);
    }

    #[test]
    fn test_apply_updates_fields() {
        let mut series = RecurrenceSeries::draft("Standup", start(), Frequency::Daily)
            .times(5)
            .build()
            .unwrap();
        let changes = SeriesChanges {
            frequency: Some(Frequency::Weekly),
            end_condition: Some(EndCondition::IterationCount(10)),
            ..Default::default()
        };
        series.apply(&changes).unwrap();
        assert_eq!(series.frequency, Frequency::Weekly);
        assert_eq!(series.end_condition, EndCondition::IterationCount(10));
    }

    #[test]
    fn test_frequency_parse() {
        assert_eq!("weekly".parse::<Frequency>().unwrap(), Frequency::Weekly);
        assert_eq!("working-days".parse::<Frequency>().unwrap(), Frequency::WorkingDays);
        assert!("hourly".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_series_state_terminal() {
        assert!(SeriesState::Completed.is_terminal());
        assert!(!SeriesState::Scheduled.is_terminal());
        assert_eq!("running".parse::<SeriesState>().unwrap(), SeriesState::Running);
    }
}
