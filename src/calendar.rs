//! Process-wide working calendar.
//!
//! Holds the working weekday set and the globally excluded (non-working)
//! dates. Built once from configuration and shared read-only behind an `Arc`.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};

/// Working weekdays plus excluded dates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingCalendar {
    /// Indexed by `Weekday::num_days_from_monday`
    working: [bool; 7],
    excluded_dates: BTreeSet<NaiveDate>,
}

impl Default for WorkingCalendar {
    /// Monday to Friday, nothing excluded
    fn default() -> Self {
        Self::monday_to_friday()
    }
}

impl WorkingCalendar {
    /// Build a calendar; the working week must contain at least one day.
    pub fn new(
        working_weekdays: impl IntoIterator<Item = Weekday>,
        excluded_dates: impl IntoIterator<Item = NaiveDate>,
    ) -> Result<Self> {
        let mut working = [false; 7];
        for day in working_weekdays {
            working[day.num_days_from_monday() as usize] = true;
        }
        if !working.iter().any(|w| *w) {
            return Err(CadenceError::invalid("working week must contain at least one weekday"));
        }
        Ok(Self {
            working,
            excluded_dates: excluded_dates.into_iter().collect(),
        })
    }

    pub fn monday_to_friday() -> Self {
        Self {
            working: [true, true, true, true, true, false, false],
            excluded_dates: BTreeSet::new(),
        }
    }

    /// Same working week, different exclusions
    pub fn with_excluded_dates(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.excluded_dates = dates.into_iter().collect();
        self
    }

    pub fn is_working_weekday(&self, day: Weekday) -> bool {
        self.working[day.num_days_from_monday() as usize]
    }

    pub fn is_excluded(&self, date: NaiveDate) -> bool {
        self.excluded_dates.contains(&date)
    }

    /// A working weekday that is not an excluded date
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.is_working_weekday(date.weekday()) && !self.is_excluded(date)
    }

    pub fn excluded_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.excluded_dates.iter().copied()
    }

    pub fn working_weekdays(&self) -> Vec<Weekday> {
        (0..7u8)
            .filter(|i| self.working[*i as usize])
            .filter_map(|i| Weekday::try_from(i).ok())
            .collect()
    }
}
