//! Series lifecycle: create, edit, delete, per-occurrence cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::domain::{
    OccurrenceState, OccurrenceView, RecurrenceSeries, ScheduledOccurrence, SeriesChanges, SeriesDraft, SeriesState,
};
use crate::error::{CadenceError, Result};
use crate::id::occurrence_dedup_key;
use crate::queue::JobQueue;
use crate::recurrence::RecurrenceCalculator;
use crate::scheduler::{MaterializationOutcome, OccurrenceScheduler};
use crate::store::{OccurrenceRegistry, SeriesRepository};

/// Front door for callers that manage series
pub struct SeriesService {
    series: Arc<dyn SeriesRepository>,
    registry: Arc<dyn OccurrenceRegistry>,
    scheduler: Arc<OccurrenceScheduler>,
    queue: Arc<dyn JobQueue>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SeriesService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesService").finish_non_exhaustive()
    }
}

impl SeriesService {
    pub fn new(
        series: Arc<dyn SeriesRepository>,
        registry: Arc<dyn OccurrenceRegistry>,
        scheduler: Arc<OccurrenceScheduler>,
        queue: Arc<dyn JobQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            series,
            registry,
            scheduler,
            queue,
            clock,
        }
    }

    fn calculator(&self) -> &RecurrenceCalculator {
        self.scheduler.calculator()
    }

    fn load(&self, id: &str) -> Result<RecurrenceSeries> {
        self.series
            .get_series(id)?
            .ok_or_else(|| CadenceError::SeriesNotFound(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Result<RecurrenceSeries> {
        self.load(id)
    }

    pub fn list(&self) -> Result<Vec<RecurrenceSeries>> {
        self.series.list_series()
    }

    /// Persist a new series, materialize its first occurrence and start the chain
    ///
    /// An anchor on an excluded date is not materialized; the chain starts at
    /// the first occurrence the calculator emits.
    pub async fn create(&self, draft: SeriesDraft) -> Result<RecurrenceSeries> {
        let series = draft.build()?;
        self.series.insert_series(&series)?;
        log::info!("Created series {} ({})", series.id, series.title);

        let anchor = self.calculator().first_occurrence(&series);
        let Some(first) = self.calculator().occurrences(&series).next() else {
            self.series.set_state(&series.id, SeriesState::Completed, None)?;
            log::info!("Series {} has no occurrences outside excluded dates, completed", series.id);
            return self.load(&series.id);
        };
        if first != anchor {
            log::info!("Anchor {} of series {} is an excluded date, starting at {}", anchor, series.id, first);
        }

        let outcome = self.scheduler.materialize_occurrence(&series, first).await?;
        if let MaterializationOutcome::Failed(reason) = &outcome {
            log::warn!("First occurrence of series {} not materialized: {}", series.id, reason);
        }
        self.scheduler.schedule_run(&series.id, first)?;

        self.load(&series.id)
    }

    /// Apply an edit and re-plan from now
    ///
    /// A completed series keeps its state; only its definition changes.
    pub async fn update(&self, id: &str, changes: &SeriesChanges) -> Result<RecurrenceSeries> {
        let mut series = self.load(id)?;
        series.apply(changes)?;
        self.series.update_series(&series)?;
        log::info!("Updated series {}", id);

        if series.state.is_terminal() {
            return Ok(series);
        }

        match self.calculator().next_occurrence(&series, self.clock.now()) {
            Some(next) => {
                self.scheduler.materialize_occurrence(&series, next).await?;
                self.scheduler.schedule_run(id, next)?;
            }
            None => {
                self.queue.cancel(&occurrence_dedup_key(id))?;
                self.series.set_state(id, SeriesState::Completed, None)?;
                log::info!("Series {} has no occurrences left after edit, completed", id);
            }
        }
        self.load(id)
    }

    /// Remove a series and its registry rows; queued runs become no-ops
    pub fn delete(&self, id: &str) -> Result<bool> {
        let deleted = self.series.delete_series(id)?;
        if deleted {
            self.queue.cancel(&occurrence_dedup_key(id))?;
            log::info!("Deleted series {}", id);
        }
        Ok(deleted)
    }

    /// Tombstone one nominal occurrence so no run materializes it
    pub fn cancel_occurrence(&self, id: &str, at: DateTime<Utc>) -> Result<ScheduledOccurrence> {
        self.set_cancelled(id, at, true)
    }

    /// Undo [`SeriesService::cancel_occurrence`]
    pub fn restore_occurrence(&self, id: &str, at: DateTime<Utc>) -> Result<ScheduledOccurrence> {
        self.set_cancelled(id, at, false)
    }

    fn set_cancelled(&self, id: &str, at: DateTime<Utc>, cancelled: bool) -> Result<ScheduledOccurrence> {
        let series = self.load(id)?;
        if !self.calculator().is_occurrence(&series, at) {
            return Err(CadenceError::UnknownOccurrence {
                series_id: id.to_string(),
                at,
            });
        }
        let occurrence = self.registry.upsert_occurrence(id, at, None, Some(cancelled))?;
        if cancelled && occurrence.is_materialized() {
            log::warn!(
                "Occurrence {} of series {} was already materialized; the concrete meeting is unaffected",
                at,
                id
            );
        }
        Ok(occurrence)
    }

    /// Next `limit` occurrences after now with their registry state
    pub fn upcoming(&self, id: &str, limit: usize) -> Result<Vec<OccurrenceView>> {
        let series = self.load(id)?;
        let known: HashMap<DateTime<Utc>, OccurrenceState> = self
            .registry
            .list_occurrences(id)?
            .into_iter()
            .map(|occ| (occ.start_time, occ.state()))
            .collect();

        let views = self
            .calculator()
            .next_n_occurrences(&series, limit, self.clock.now())
            .into_iter()
            .map(|start_time| OccurrenceView {
                start_time,
                state: known.get(&start_time).cloned().unwrap_or(OccurrenceState::Pending),
            })
            .collect();
        Ok(views)
    }
}
