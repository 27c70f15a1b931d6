//! Self-rescheduling background job for one series.
//!
//! Each run materializes the next occurrence after "now" (at most once per
//! nominal time) and queues the following run for that occurrence's start.
//! The chain ends when the calculator has nothing left.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use super::locks::SeriesLocks;
use super::materializer::Materializer;
use crate::clock::Clock;
use crate::domain::{MaterializedRef, RecurrenceSeries, SeriesState};
use crate::error::{CadenceError, Result};
use crate::queue::{EnqueueOutcome, JobHandler, JobKind, JobQueue, ScheduledRun};
use crate::recurrence::RecurrenceCalculator;
use crate::store::{ClaimOutcome, OccurrenceRegistry, SeriesRepository};

/// Tunables for [`OccurrenceScheduler`]
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Age after which another worker may take over a claim
    pub claim_ttl: TimeDelta,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            claim_ttl: TimeDelta::minutes(10),
        }
    }
}

/// What happened to the target occurrence during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializationOutcome {
    Created(MaterializedRef),
    AlreadyMaterialized(MaterializedRef),
    Cancelled,
    /// Another worker holds a live claim on the same occurrence
    ClaimedElsewhere,
    /// Materializer returned an error; the claim was released
    Failed(String),
}

/// Result of one [`OccurrenceScheduler::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Series was deleted; nothing to do
    SeriesMissing,
    /// Series already finished; nothing to do
    AlreadyCompleted,
    /// Another run for this series is executing in this process
    InFlight,
    /// No occurrence after now; series marked completed
    Completed,
    /// Target handled and the next run queued at `target`
    Rescheduled {
        target: DateTime<Utc>,
        materialization: MaterializationOutcome,
    },
    /// Storage or queue failure; series state may be stale until recovery
    Failed(String),
}

pub struct OccurrenceScheduler {
    series: Arc<dyn SeriesRepository>,
    registry: Arc<dyn OccurrenceRegistry>,
    calculator: Arc<RecurrenceCalculator>,
    materializer: Arc<dyn Materializer>,
    queue: Arc<dyn JobQueue>,
    clock: Arc<dyn Clock>,
    locks: SeriesLocks,
    config: SchedulerConfig,
}

impl std::fmt::Debug for OccurrenceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OccurrenceScheduler")
            .field("config", &self.config)
            .field("locks", &self.locks)
            .finish()
    }
}

impl OccurrenceScheduler {
    pub fn new(
        series: Arc<dyn SeriesRepository>,
        registry: Arc<dyn OccurrenceRegistry>,
        calculator: Arc<RecurrenceCalculator>,
        materializer: Arc<dyn Materializer>,
        queue: Arc<dyn JobQueue>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            series,
            registry,
            calculator,
            materializer,
            queue,
            clock,
            locks: SeriesLocks::new(),
            config,
        }
    }

    pub fn calculator(&self) -> &RecurrenceCalculator {
        &self.calculator
    }

    /// Materialize the next occurrence and queue the following run
    pub async fn run(&self, series_id: &str) -> RunOutcome {
        match self.try_run(series_id).await {
            Ok(outcome) => outcome,
            Err(CadenceError::SeriesNotFound(_)) => {
                log::info!("Series {} no longer exists, dropping scheduled run", series_id);
                RunOutcome::SeriesMissing
            }
            Err(e) => {
                log::error!("Scheduled run for series {} failed: {}", series_id, e);
                RunOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_run(&self, series_id: &str) -> Result<RunOutcome> {
        let series = self
            .series
            .get_series(series_id)?
            .ok_or_else(|| CadenceError::SeriesNotFound(series_id.to_string()))?;
        if series.state.is_terminal() {
            log::debug!("Series {} already completed", series_id);
            return Ok(RunOutcome::AlreadyCompleted);
        }

        let Some(_guard) = self.locks.try_acquire(series_id) else {
            log::debug!("Series {} already has a run in progress", series_id);
            return Ok(RunOutcome::InFlight);
        };

        self.series.set_state(series_id, SeriesState::Running, series.next_run_at)?;

        let now = self.clock.now();
        let Some(target) = self.calculator.next_occurrence(&series, now) else {
            self.series.set_state(series_id, SeriesState::Completed, None)?;
            log::info!("Series {} has no occurrences after {}, completed", series_id, now);
            return Ok(RunOutcome::Completed);
        };

        let materialization = self.materialize_occurrence(&series, target).await?;
        self.schedule_run(series_id, target)?;

        Ok(RunOutcome::Rescheduled {
            target,
            materialization,
        })
    }

    /// Claim `at` and materialize it unless it already exists or was cancelled
    ///
    /// Materializer failures are logged and reported, not propagated.
    pub async fn materialize_occurrence(
        &self,
        series: &RecurrenceSeries,
        at: DateTime<Utc>,
    ) -> Result<MaterializationOutcome> {
        let claim = self
            .registry
            .claim_occurrence(&series.id, at, self.clock.now(), self.config.claim_ttl)?;

        match claim {
            ClaimOutcome::AlreadyMaterialized(r) => Ok(MaterializationOutcome::AlreadyMaterialized(r)),
            ClaimOutcome::Cancelled => {
                log::info!("Occurrence {} of series {} is cancelled, skipping", at, series.id);
                Ok(MaterializationOutcome::Cancelled)
            }
            ClaimOutcome::InFlight { claimed_at } => {
                log::debug!(
                    "Occurrence {} of series {} claimed elsewhere at {}",
                    at,
                    series.id,
                    claimed_at
                );
                Ok(MaterializationOutcome::ClaimedElsewhere)
            }
            ClaimOutcome::Claimed => match self.materializer.materialize(series, at).await {
                Ok(reference) => {
                    self.registry.complete_occurrence(&series.id, at, &reference)?;
                    log::info!("Materialized {} for series {} at {}", reference, series.id, at);
                    Ok(MaterializationOutcome::Created(reference))
                }
                Err(e) => {
                    let err = CadenceError::MaterializationFailed {
                        series_id: series.id.clone(),
                        at,
                        reason: e.to_string(),
                    };
                    log::warn!("{}", err);
                    self.registry.release_occurrence(&series.id, at)?;
                    Ok(MaterializationOutcome::Failed(e.to_string()))
                }
            },
        }
    }

    /// Queue a run at `at` and record it on the series
    ///
    /// Returns when the surviving queued run will fire.
    pub fn schedule_run(&self, series_id: &str, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let outcome = self.queue.enqueue(ScheduledRun::init_next_occurrence(series_id, at))?;
        let next_run_at = outcome.effective_time(at);
        self.series
            .set_state(series_id, SeriesState::Scheduled, Some(next_run_at))?;
        log::debug!("Series {} next run at {}", series_id, next_run_at);
        Ok(next_run_at)
    }

    /// Queue a run at `at` without touching the stored series
    pub fn requeue(&self, series_id: &str, at: DateTime<Utc>) -> Result<EnqueueOutcome> {
        self.queue.enqueue(ScheduledRun::init_next_occurrence(series_id, at))
    }
}

#[async_trait]
impl JobHandler for OccurrenceScheduler {
    async fn handle(&self, run: ScheduledRun) {
        match run.kind {
            JobKind::InitNextOccurrence { series_id } => {
                let outcome = self.run(&series_id).await;
                tracing::debug!(series_id = %series_id, outcome = ?outcome, "scheduled run finished");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::WorkingCalendar;
    use crate::clock::ManualClock;
    use crate::domain::Frequency;
    use crate::queue::DelayedQueue;
    use crate::scheduler::MaterializeError;
    use crate::store::ScheduleStore;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingMaterializer {
        calls: Mutex<Vec<DateTime<Utc>>>,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl Materializer for CountingMaterializer {
        async fn materialize(
            &self,
            series: &RecurrenceSeries,
            at: DateTime<Utc>,
        ) -> std::result::Result<MaterializedRef, MaterializeError> {
            if *self.fail.lock().unwrap() {
                return Err(MaterializeError::Unavailable("calendar down".to_string()));
            }
            self.calls.lock().unwrap().push(at);
            Ok(MaterializedRef::new(format!("mtg-{}-{}", series.id, at.timestamp())))
        }
    }

    struct Harness {
        store: Arc<ScheduleStore>,
        queue: Arc<DelayedQueue>,
        clock: Arc<ManualClock>,
        materializer: Arc<CountingMaterializer>,
        scheduler: OccurrenceScheduler,
    }

    fn utc(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, h, 0, 0).unwrap()
    }

    fn harness(now: DateTime<Utc>) -> Harness {
        let store = Arc::new(ScheduleStore::open_in_memory().unwrap());
        let queue = Arc::new(DelayedQueue::new());
        let clock = Arc::new(ManualClock::new(now));
        let materializer = Arc::new(CountingMaterializer::default());
        let calculator = Arc::new(RecurrenceCalculator::new(Arc::new(WorkingCalendar::default())));
        let scheduler = OccurrenceScheduler::new(
            store.clone(),
            store.clone(),
            calculator,
            materializer.clone(),
            queue.clone(),
            clock.clone(),
            SchedulerConfig::default(),
        );
        Harness {
            store,
            queue,
            clock,
            materializer,
            scheduler,
        }
    }

    fn daily(count: u32) -> RecurrenceSeries {
        RecurrenceSeries::draft("Standup", utc(6, 9), Frequency::Daily)
            .times(count)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_run_materializes_next_and_reschedules() {
        let h = harness(utc(6, 10));
        let series = daily(3);
        h.store.insert_series(&series).unwrap();

        let outcome = h.scheduler.run(&series.id).await;
        match outcome {
            RunOutcome::Rescheduled {
                target,
                materialization: MaterializationOutcome::Created(_),
            } => assert_eq!(target, utc(7, 9)),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let queued = h.queue.pending();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].wait_until, utc(7, 9));

        let stored = h.store.get_series(&series.id).unwrap().unwrap();
        assert_eq!(stored.state, SeriesState::Scheduled);
        assert_eq!(stored.next_run_at, Some(utc(7, 9)));
    }

    #[tokio::test]
    async fn test_run_twice_materializes_once() {
        let h = harness(utc(6, 10));
        let series = daily(3);
        h.store.insert_series(&series).unwrap();

        h.scheduler.run(&series.id).await;
        let second = h.scheduler.run(&series.id).await;
        assert!(matches!(
            second,
            RunOutcome::Rescheduled {
                materialization: MaterializationOutcome::AlreadyMaterialized(_),
                ..
            }
        ));
        assert_eq!(h.materializer.calls.lock().unwrap().len(), 1);
        assert_eq!(h.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_run_completes_after_last_occurrence() {
        let h = harness(utc(8, 9));
        let series = daily(3);
        h.store.insert_series(&series).unwrap();

        assert_eq!(h.scheduler.run(&series.id).await, RunOutcome::Completed);
        let stored = h.store.get_series(&series.id).unwrap().unwrap();
        assert_eq!(stored.state, SeriesState::Completed);
        assert_eq!(stored.next_run_at, None);
        assert!(h.queue.is_empty());

        assert_eq!(h.scheduler.run(&series.id).await, RunOutcome::AlreadyCompleted);
        assert_eq!(h.store.count_occurrences().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_for_deleted_series_is_noop() {
        let h = harness(utc(6, 10));
        assert_eq!(h.scheduler.run("ser-gone").await, RunOutcome::SeriesMissing);
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_occurrence_is_skipped() {
        let h = harness(utc(6, 10));
        let series = daily(3);
        h.store.insert_series(&series).unwrap();
        h.store
            .upsert_occurrence(&series.id, utc(7, 9), None, Some(true))
            .unwrap();

        let outcome = h.scheduler.run(&series.id).await;
        assert_eq!(
            outcome,
            RunOutcome::Rescheduled {
                target: utc(7, 9),
                materialization: MaterializationOutcome::Cancelled,
            }
        );
        assert!(h.materializer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_materialization_releases_claim_and_continues() {
        let h = harness(utc(6, 10));
        let series = daily(3);
        h.store.insert_series(&series).unwrap();
        *h.materializer.fail.lock().unwrap() = true;

        let outcome = h.scheduler.run(&series.id).await;
        assert!(matches!(
            outcome,
            RunOutcome::Rescheduled {
                materialization: MaterializationOutcome::Failed(_),
                ..
            }
        ));
        let row = h.store.find_occurrence(&series.id, utc(7, 9)).unwrap().unwrap();
        assert!(row.claimed_at.is_none());
        assert!(!row.is_materialized());
        assert_eq!(h.queue.len(), 1);

        *h.materializer.fail.lock().unwrap() = false;
        let retry = h.scheduler.run(&series.id).await;
        assert!(matches!(
            retry,
            RunOutcome::Rescheduled {
                materialization: MaterializationOutcome::Created(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_chain_walks_to_completion() {
        let h = harness(utc(6, 9));
        let series = daily(3);
        h.store.insert_series(&series).unwrap();

        h.scheduler.run(&series.id).await;
        while let Some(due) = h.queue.next_due_at() {
            h.clock.set(due);
            for job in h.queue.pop_due(due).unwrap() {
                h.scheduler.handle(job).await;
            }
        }

        let calls = h.materializer.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![utc(7, 9), utc(8, 9)]);
        let stored = h.store.get_series(&series.id).unwrap().unwrap();
        assert_eq!(stored.state, SeriesState::Completed);
    }

    #[tokio::test]
    async fn test_schedule_run_keeps_earlier_queued_time() {
        let h = harness(utc(6, 9));
        let series = daily(5);
        h.store.insert_series(&series).unwrap();

        assert_eq!(h.scheduler.schedule_run(&series.id, utc(7, 9)).unwrap(), utc(7, 9));
        assert_eq!(h.scheduler.schedule_run(&series.id, utc(8, 9)).unwrap(), utc(7, 9));
        let stored = h.store.get_series(&series.id).unwrap().unwrap();
        assert_eq!(stored.next_run_at, Some(utc(7, 9)));
    }
}
