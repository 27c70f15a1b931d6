//! Startup recovery - Rebuilds the in-memory queue from persisted series
//!
//! The queue does not survive a restart. On daemon start every series that is
//! not completed gets its run queued again:
//! - `Scheduled` series at their recorded `next_run_at`
//! - `Idle`/`Running` series (interrupted mid-create or mid-run) right away
//!
//! While the daemon runs, [`Recovery::sweep`] picks up `Scheduled` series
//! written by other processes (CLI create/update) sharing the database.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::domain::{RecurrenceSeries, SeriesState};
use crate::error::Result;
use crate::queue::{EnqueueOutcome, QueueSweep};
use crate::scheduler::OccurrenceScheduler;
use crate::store::SeriesRepository;

/// Result of recovering a single series
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Run queued again
    Requeued { series_id: String, at: DateTime<Utc> },
    /// Completed series, nothing to queue
    Skipped { series_id: String },
}

/// Re-enqueues runs lost with the previous process
pub struct Recovery {
    series: Arc<dyn SeriesRepository>,
    scheduler: Arc<OccurrenceScheduler>,
    clock: Arc<dyn Clock>,
}

impl Recovery {
    pub fn new(series: Arc<dyn SeriesRepository>, scheduler: Arc<OccurrenceScheduler>, clock: Arc<dyn Clock>) -> Self {
        Self {
            series,
            scheduler,
            clock,
        }
    }

    /// Recover every persisted series
    pub fn recover_all(&self) -> Result<Vec<RecoveryAction>> {
        let mut actions = Vec::new();
        for series in self.series.list_series()? {
            actions.push(self.recover_series(&series)?);
        }
        let requeued = actions
            .iter()
            .filter(|a| matches!(a, RecoveryAction::Requeued { .. }))
            .count();
        log::info!("Recovery requeued {} of {} series", requeued, actions.len());
        Ok(actions)
    }

    pub fn recover_series(&self, series: &RecurrenceSeries) -> Result<RecoveryAction> {
        if series.state == SeriesState::Completed {
            return Ok(RecoveryAction::Skipped {
                series_id: series.id.clone(),
            });
        }

        let wanted = match (series.state, series.next_run_at) {
            (SeriesState::Scheduled, Some(at)) => at,
            _ => self.clock.now(),
        };
        let at = self.scheduler.schedule_run(&series.id, wanted)?;
        log::debug!("Recovered series {} ({}) at {}", series.id, series.state.as_str(), at);

        Ok(RecoveryAction::Requeued {
            series_id: series.id.clone(),
            at,
        })
    }

    /// Queue every `Scheduled` series at its recorded `next_run_at`
    ///
    /// Stored state is left alone; queue deduplication keeps repeated sweeps
    /// idempotent. Returns how many runs were newly queued or moved earlier.
    pub fn sweep(&self) -> Result<usize> {
        let mut queued = 0;
        for series in self.series.list_series()? {
            let (SeriesState::Scheduled, Some(at)) = (series.state, series.next_run_at) else {
                continue;
            };
            match self.scheduler.requeue(&series.id, at)? {
                EnqueueOutcome::Deduplicated { .. } => {}
                outcome => {
                    log::debug!("Sweep queued series {} at {} ({:?})", series.id, at, outcome);
                    queued += 1;
                }
            }
        }
        Ok(queued)
    }

    /// Count of series that need a queued run
    pub fn count_pending(&self) -> Result<usize> {
        Ok(self
            .series
            .list_series()?
            .iter()
            .filter(|s| !s.state.is_terminal())
            .count())
    }
}

impl QueueSweep for Recovery {
    fn sweep(&self) -> Result<usize> {
        Recovery::sweep(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::WorkingCalendar;
    use crate::clock::ManualClock;
    use crate::domain::Frequency;
    use crate::queue::DelayedQueue;
    use crate::recurrence::RecurrenceCalculator;
    use crate::scheduler::{JournalMaterializer, SchedulerConfig};
    use crate::store::ScheduleStore;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn utc(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, h, 0, 0).unwrap()
    }

    fn setup_test() -> (TempDir, Arc<ScheduleStore>, Arc<DelayedQueue>, Recovery) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(ScheduleStore::open_at(temp.path()).unwrap());
        let queue = Arc::new(DelayedQueue::new());
        let clock = Arc::new(ManualClock::new(utc(10, 12)));
        let scheduler = Arc::new(OccurrenceScheduler::new(
            store.clone(),
            store.clone(),
            Arc::new(RecurrenceCalculator::new(Arc::new(WorkingCalendar::default()))),
            Arc::new(JournalMaterializer::new(temp.path().join("journal")).unwrap()),
            queue.clone(),
            clock.clone(),
            SchedulerConfig::default(),
        ));
        let recovery = Recovery::new(store.clone(), scheduler, clock);
        (temp, store, queue, recovery)
    }

    fn make_series(state: SeriesState, next_run_at: Option<DateTime<Utc>>) -> RecurrenceSeries {
        let mut series = RecurrenceSeries::draft("Standup", utc(6, 9), Frequency::Daily)
            .times(30)
            .build()
            .unwrap();
        series.state = state;
        series.next_run_at = next_run_at;
        series
    }

    #[test]
    fn test_recover_skips_completed() {
        let (_temp, store, queue, recovery) = setup_test();
        let series = make_series(SeriesState::Completed, None);
        store.insert_series(&series).unwrap();

        let action = recovery.recover_series(&series).unwrap();
        assert_eq!(
            action,
            RecoveryAction::Skipped {
                series_id: series.id.clone()
            }
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_recover_scheduled_uses_next_run_at() {
        let (_temp, store, queue, recovery) = setup_test();
        let series = make_series(SeriesState::Scheduled, Some(utc(11, 9)));
        store.insert_series(&series).unwrap();

        let action = recovery.recover_series(&series).unwrap();
        assert_eq!(
            action,
            RecoveryAction::Requeued {
                series_id: series.id.clone(),
                at: utc(11, 9)
            }
        );
        assert_eq!(queue.next_due_at(), Some(utc(11, 9)));
    }

    #[test]
    fn test_recover_interrupted_run_queues_now() {
        let (_temp, store, queue, recovery) = setup_test();
        let series = make_series(SeriesState::Running, Some(utc(10, 9)));
        store.insert_series(&series).unwrap();

        recovery.recover_series(&series).unwrap();
        assert_eq!(queue.next_due_at(), Some(utc(10, 12)));
        let stored = store.get_series(&series.id).unwrap().unwrap();
        assert_eq!(stored.state, SeriesState::Scheduled);
    }

    #[test]
    fn test_recover_all_and_count_pending() {
        let (_temp, store, queue, recovery) = setup_test();
        store.insert_series(&make_series(SeriesState::Scheduled, Some(utc(11, 9)))).unwrap();
        store.insert_series(&make_series(SeriesState::Idle, None)).unwrap();
        store.insert_series(&make_series(SeriesState::Completed, None)).unwrap();

        assert_eq!(recovery.count_pending().unwrap(), 2);
        let actions = recovery.recover_all().unwrap();
        assert_eq!(actions.len(), 3);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_sweep_queues_scheduled_series_once() {
        let (_temp, store, queue, recovery) = setup_test();
        let scheduled = make_series(SeriesState::Scheduled, Some(utc(11, 9)));
        store.insert_series(&scheduled).unwrap();
        store.insert_series(&make_series(SeriesState::Idle, None)).unwrap();
        store.insert_series(&make_series(SeriesState::Completed, None)).unwrap();

        assert_eq!(recovery.sweep().unwrap(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_due_at(), Some(utc(11, 9)));

        // Nothing new on a second pass
        assert_eq!(recovery.sweep().unwrap(), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_sweep_moves_run_earlier_after_external_edit() {
        let (_temp, store, queue, recovery) = setup_test();
        let series = make_series(SeriesState::Scheduled, Some(utc(12, 9)));
        store.insert_series(&series).unwrap();
        recovery.sweep().unwrap();

        store
            .set_state(&series.id, SeriesState::Scheduled, Some(utc(11, 9)))
            .unwrap();
        assert_eq!(recovery.sweep().unwrap(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_due_at(), Some(utc(11, 9)));

        let stored = store.get_series(&series.id).unwrap().unwrap();
        assert_eq!(stored.next_run_at, Some(utc(11, 9)));
    }
}
