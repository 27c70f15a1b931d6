//! Engine - Wires store, calculator, queue and scheduler together
//!
//! One engine per process. The CLI builds it from configuration; tests build
//! it with an in-memory store and a manual clock.

use std::sync::Arc;

use crate::calendar::WorkingCalendar;
use crate::clock::Clock;
use crate::queue::{DelayedQueue, Worker, WorkerConfig};
use crate::recurrence::RecurrenceCalculator;
use crate::scheduler::{Materializer, OccurrenceScheduler, SchedulerConfig};
use crate::service::{Recovery, SeriesService};
use crate::store::ScheduleStore;

/// Shared components for one scheduling process
pub struct Engine {
    /// Series definitions and occurrence registry
    pub store: Arc<ScheduleStore>,
    /// Pending runs, one per series
    pub queue: Arc<DelayedQueue>,
    /// Job executed for each queued run
    pub scheduler: Arc<OccurrenceScheduler>,
    /// Caller-facing series operations
    pub service: SeriesService,
    /// Restart handling and periodic sweeps
    pub recovery: Arc<Recovery>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store)
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        store: Arc<ScheduleStore>,
        calendar: WorkingCalendar,
        materializer: Arc<dyn Materializer>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let queue = Arc::new(DelayedQueue::new());
        let calculator = Arc::new(RecurrenceCalculator::new(Arc::new(calendar)));

        let scheduler = Arc::new(OccurrenceScheduler::new(
            store.clone(),
            store.clone(),
            calculator,
            materializer,
            queue.clone(),
            clock.clone(),
            config,
        ));

        let service = SeriesService::new(
            store.clone(),
            store.clone(),
            scheduler.clone(),
            queue.clone(),
            clock.clone(),
        );
        let recovery = Arc::new(Recovery::new(store.clone(), scheduler.clone(), clock.clone()));

        Self {
            store,
            queue,
            scheduler,
            service,
            recovery,
            clock,
        }
    }

    pub fn calculator(&self) -> &RecurrenceCalculator {
        self.scheduler.calculator()
    }

    /// Worker draining this engine's queue into its scheduler
    ///
    /// The worker sweeps the store on `sweep_interval` so runs scheduled by
    /// other processes on the same database are picked up.
    pub fn worker(&self, config: WorkerConfig) -> Worker {
        Worker::new(self.queue.clone(), self.scheduler.clone(), self.clock.clone(), config)
            .with_sweeper(self.recovery.clone())
    }
}
