//! Human-readable schedule summaries.

use crate::domain::{EndCondition, Frequency, RecurrenceSeries};

/// One-line description, e.g. "Every week on Tuesday at 13:30 (UTC), ends on 2025-01-15"
pub fn describe(series: &RecurrenceSeries) -> String {
    let local = series.local_start();
    let interval = series.interval;

    let cadence = match (series.frequency, interval) {
        (Frequency::Daily, 1) => "Every day".to_string(),
        (Frequency::Daily, n) => format!("Every {} days", n),
        (Frequency::WorkingDays, 1) => "Every working day".to_string(),
        (Frequency::WorkingDays, n) => format!("Every {} working days", n),
        (Frequency::Weekly, 1) => format!("Every week on {}", local.format("%A")),
        (Frequency::Weekly, n) => format!("Every {} weeks on {}", n, local.format("%A")),
    };

    let end = match series.end_condition {
        EndCondition::SpecificDate(date) => format!("ends on {}", date.format("%Y-%m-%d")),
        EndCondition::IterationCount(1) => "1 occurrence".to_string(),
        EndCondition::IterationCount(n) => format!("{} occurrences", n),
    };

    format!("{} at {} ({}), {}", cadence, local.format("%H:%M"), series.time_zone.name(), end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn test_describe_weekly_until() {
        let series = RecurrenceSeries::draft("w", Utc.with_ymd_and_hms(2024, 12, 31, 13, 30, 0).unwrap(), Frequency::Weekly)
            .until(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
            .build()
            .unwrap();
        assert_eq!(describe(&series), "Every week on Tuesday at 13:30 (UTC), ends on 2025-01-15");
    }

    #[test]
    fn test_describe_daily_interval_in_zone() {
        let series = RecurrenceSeries::draft("d", Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap(), Frequency::Daily)
            .every(2)
            .times(5)
            .in_time_zone(chrono_tz::Europe::Berlin)
            .build()
            .unwrap();
        assert_eq!(describe(&series), "Every 2 days at 09:00 (Europe/Berlin), 5 occurrences");
    }

    #[test]
    fn test_describe_working_days_single() {
        let series = RecurrenceSeries::draft("w", Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap(), Frequency::WorkingDays)
            .build()
            .unwrap();
        assert_eq!(describe(&series), "Every working day at 08:00 (UTC), 1 occurrence");
    }
}
