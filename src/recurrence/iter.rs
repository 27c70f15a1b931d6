//! Lazy occurrence generation.
//!
//! [`OccurrenceIter`] walks raw candidates in the series' local wall-clock
//! time, drops excluded dates, and stops at the end condition. It holds no
//! state beyond its cursor, so two iterators over the same inputs always agree.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::calendar::WorkingCalendar;
use crate::domain::{EndCondition, Frequency, RecurrenceSeries};

/// Ascending, finite sequence of occurrence timestamps
#[derive(Debug, Clone)]
pub struct OccurrenceIter<'a> {
    series: &'a RecurrenceSeries,
    calendar: &'a WorkingCalendar,
    /// Local date of the next raw candidate
    cursor: Option<NaiveDate>,
    /// Raw candidate index of `cursor`; index 0 is the anchor
    index: u64,
    /// Non-excluded candidates produced (or skipped by a seek) so far
    emitted: u64,
    wall_time: NaiveTime,
}

impl<'a> OccurrenceIter<'a> {
    /// Iterate from the anchor
    pub fn new(series: &'a RecurrenceSeries, calendar: &'a WorkingCalendar) -> Self {
        let local = series.local_start();
        Self {
            series,
            calendar,
            cursor: Some(local.date_naive()),
            index: 0,
            emitted: 0,
            wall_time: local.time(),
        }
    }

    /// Iterate from a point shortly before `at`.
    ///
    /// Every skipped candidate is strictly earlier than `at`. Only daily and
    /// weekly series can jump; working-day series scan from the anchor.
    pub fn seek(series: &'a RecurrenceSeries, calendar: &'a WorkingCalendar, at: DateTime<Utc>) -> Self {
        let mut iter = Self::new(series, calendar);
        let Some(step) = fixed_step_days(series) else {
            return iter;
        };

        let elapsed_days = (at - series.start_time).num_days();
        // One step of slack absorbs zone offsets and DST shifts.
        let skip = (elapsed_days / step as i64) - 1;
        if skip <= 0 {
            return iter;
        }
        let skip = skip as u64;

        let Some(start_date) = iter.cursor else {
            return iter;
        };
        iter.cursor = skip
            .checked_mul(step)
            .and_then(|days| start_date.checked_add_days(Days::new(days)));
        iter.index = skip;
        iter.emitted = skip - excluded_candidates_before(calendar, start_date, step, skip);
        iter
    }

    fn timestamp_for(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        if self.index == 0 {
            return Some(self.series.start_time);
        }
        resolve_local(self.series.time_zone, date.and_time(self.wall_time))
    }

    fn advance(&mut self) {
        let Some(date) = self.cursor else {
            return;
        };
        self.index += 1;
        self.cursor = match self.series.frequency {
            Frequency::Daily | Frequency::Weekly => fixed_step_days(self.series)
                .and_then(|step| date.checked_add_days(Days::new(step))),
            Frequency::WorkingDays => next_working_weekday(self.calendar, date, self.series.interval),
        };
    }
}

impl Iterator for OccurrenceIter<'_> {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let date = self.cursor?;

            match self.series.end_condition {
                EndCondition::SpecificDate(end) if date > end => {
                    self.cursor = None;
                    return None;
                }
                EndCondition::IterationCount(n) if self.emitted >= n as u64 => {
                    self.cursor = None;
                    return None;
                }
                _ => {}
            }

            let timestamp = self.timestamp_for(date);
            self.advance();

            if self.calendar.is_excluded(date) {
                continue;
            }
            let Some(timestamp) = timestamp else {
                continue;
            };
            self.emitted += 1;
            return Some(timestamp);
        }
    }
}

/// Calendar days between candidates, for frequencies with a fixed stride
fn fixed_step_days(series: &RecurrenceSeries) -> Option<u64> {
    let interval = series.interval.max(1) as u64;
    match series.frequency {
        Frequency::Daily => Some(interval),
        Frequency::Weekly => Some(interval * 7),
        Frequency::WorkingDays => None,
    }
}

/// Walk forward day by day until `count` working weekdays have passed
fn next_working_weekday(calendar: &WorkingCalendar, from: NaiveDate, count: u32) -> Option<NaiveDate> {
    let mut date = from;
    let mut remaining = count.max(1);
    while remaining > 0 {
        date = date.succ_opt()?;
        if calendar.is_working_weekday(chrono::Datelike::weekday(&date)) {
            remaining -= 1;
        }
    }
    Some(date)
}

/// Excluded dates that coincide with a raw candidate of index < `skip`
fn excluded_candidates_before(calendar: &WorkingCalendar, start: NaiveDate, step: u64, skip: u64) -> u64 {
    calendar
        .excluded_dates()
        .filter(|d| *d >= start)
        .filter(|d| {
            let offset = (*d - start).num_days() as u64;
            offset % step == 0 && offset / step < skip
        })
        .count() as u64
}

/// Local wall time to UTC: gaps shift forward an hour, overlaps take the earlier instant
pub(crate) fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}
