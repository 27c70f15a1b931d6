//! RecurrenceCalculator: pure occurrence queries over a series.

use std::sync::Arc;

use chrono::{DateTime, Days, Utc};

use super::iter::{OccurrenceIter, resolve_local};
use crate::calendar::WorkingCalendar;
use crate::domain::{EndCondition, Frequency, RecurrenceSeries};

/// Stateless occurrence calculator bound to the shared working calendar
#[derive(Debug, Clone)]
pub struct RecurrenceCalculator {
    calendar: Arc<WorkingCalendar>,
}

impl RecurrenceCalculator {
    pub fn new(calendar: Arc<WorkingCalendar>) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &WorkingCalendar {
        &self.calendar
    }

    /// Every occurrence of the series, lazily
    pub fn occurrences<'a>(&'a self, series: &'a RecurrenceSeries) -> OccurrenceIter<'a> {
        OccurrenceIter::new(series, &self.calendar)
    }

    /// The anchor, even when it lands on an excluded date
    pub fn first_occurrence(&self, series: &RecurrenceSeries) -> DateTime<Utc> {
        series.start_time
    }

    /// Final occurrence before the end condition, `None` if the series produces nothing
    pub fn last_occurrence(&self, series: &RecurrenceSeries) -> Option<DateTime<Utc>> {
        match (series.end_condition, series.frequency) {
            (EndCondition::SpecificDate(_), Frequency::Daily | Frequency::Weekly) => {
                self.last_before_end_date(series)
            }
            _ => self.occurrences(series).last(),
        }
    }

    /// Earliest occurrence strictly after `after`
    pub fn next_occurrence(&self, series: &RecurrenceSeries, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        OccurrenceIter::seek(series, &self.calendar, after).find(|t| *t > after)
    }

    /// Up to `limit` occurrences strictly after `after`, ascending
    pub fn next_n_occurrences(
        &self,
        series: &RecurrenceSeries,
        limit: usize,
        after: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        OccurrenceIter::seek(series, &self.calendar, after)
            .skip_while(|t| *t <= after)
            .take(limit)
            .collect()
    }

    /// All occurrences in `[from, to]`
    pub fn occurrences_between(
        &self,
        series: &RecurrenceSeries,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        if to < from {
            return Vec::new();
        }
        OccurrenceIter::seek(series, &self.calendar, from)
            .skip_while(|t| *t < from)
            .take_while(|t| *t <= to)
            .collect()
    }

    /// Whether `at` is exactly one of the series' occurrences
    pub fn is_occurrence(&self, series: &RecurrenceSeries, at: DateTime<Utc>) -> bool {
        OccurrenceIter::seek(series, &self.calendar, at)
            .find(|t| *t >= at)
            .is_some_and(|t| t == at)
    }

    /// Fixed-stride series: jump to the last raw candidate on or before the
    /// end date and walk back over excluded ones.
    fn last_before_end_date(&self, series: &RecurrenceSeries) -> Option<DateTime<Utc>> {
        let EndCondition::SpecificDate(end) = series.end_condition else {
            return None;
        };
        let step = match series.frequency {
            Frequency::Daily => series.interval.max(1) as i64,
            Frequency::Weekly => series.interval.max(1) as i64 * 7,
            Frequency::WorkingDays => return self.occurrences(series).last(),
        };

        let local = series.local_start();
        let start_date = local.date_naive();
        let span = (end - start_date).num_days();
        if span < 0 {
            return None;
        }

        let mut index = span / step;
        loop {
            let date = start_date.checked_add_days(Days::new((index * step) as u64))?;
            if !self.calendar.is_excluded(date) {
                if index == 0 {
                    return Some(series.start_time);
                }
                if let Some(t) = resolve_local(series.time_zone, date.and_time(local.time())) {
                    return Some(t);
                }
            }
            if index == 0 {
                return None;
            }
            index -= 1;
        }
    }
}
