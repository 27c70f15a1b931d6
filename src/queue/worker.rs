//! Worker - Drains the delayed queue
//!
//! The worker loop:
//! - Sleeps until the earliest queued job is due (or an enqueue wakes it)
//! - Hands due jobs to a [`JobHandler`] on a bounded pool of tasks
//! - Periodically refills the queue from a [`QueueSweep`], picking up runs
//!   other processes recorded in the shared database
//! - Stops on a shutdown signal after in-flight jobs finish

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;

use super::delayed::DelayedQueue;
use super::job::ScheduledRun;
use crate::clock::Clock;
use crate::error::{CadenceError, Result};

/// Executes one due job
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, run: ScheduledRun);
}

/// Re-enqueues runs recorded outside this process's queue
pub trait QueueSweep: Send + Sync {
    /// Returns how many runs were newly queued or moved earlier
    fn sweep(&self) -> Result<usize>;
}

/// Configuration for the worker loop
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs executing at once
    pub concurrency: usize,
    /// Longest sleep between queue checks
    pub max_idle: Duration,
    /// Time between sweeps when a [`QueueSweep`] is attached
    pub sweep_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_idle: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Self::default()
        }
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }
}

/// Counters for a worker session
#[derive(Debug, Default)]
pub struct WorkerStats {
    started: AtomicU64,
    panicked: AtomicU64,
    swept: AtomicU64,
}

impl WorkerStats {
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Runs queued by sweeps
    pub fn swept(&self) -> u64 {
        self.swept.load(Ordering::Relaxed)
    }
}

/// Pulls due jobs from a [`DelayedQueue`] and runs them
pub struct Worker {
    queue: Arc<DelayedQueue>,
    handler: Arc<dyn JobHandler>,
    sweeper: Option<Arc<dyn QueueSweep>>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
    shutdown_tx: broadcast::Sender<()>,
    stats: Arc<WorkerStats>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl Worker {
    pub fn new(
        queue: Arc<DelayedQueue>,
        handler: Arc<dyn JobHandler>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            queue,
            handler,
            sweeper: None,
            clock,
            config,
            shutdown_tx,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Attach a sweep that runs every `sweep_interval` while [`Worker::run`] is active
    pub fn with_sweeper(mut self, sweeper: Arc<dyn QueueSweep>) -> Self {
        self.sweeper = Some(sweeper);
        self
    }

    /// Sender that stops [`Worker::run`] when signalled
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Run every job due now to completion, one at a time
    ///
    /// Returns the number of jobs executed.
    pub async fn drain_due(&self) -> Result<usize> {
        let due = self.queue.pop_due(self.clock.now())?;
        let count = due.len();
        for run in due {
            self.stats.started.fetch_add(1, Ordering::Relaxed);
            self.handler.handle(run).await;
        }
        Ok(count)
    }

    /// Main loop until shutdown
    pub async fn run(&self) -> Result<()> {
        if self.config.concurrency == 0 {
            return Err(CadenceError::Queue("worker concurrency must be at least 1".to_string()));
        }
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut tasks = JoinSet::new();

        log::info!("Worker started with concurrency {}", self.config.concurrency);

        let sweep_task = self.sweeper.clone().map(|sweeper| {
            let interval = self.config.sweep_interval;
            let stats = Arc::clone(&self.stats);
            let mut sweep_shutdown_rx = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            match sweeper.sweep() {
                                Ok(0) => {}
                                Ok(queued) => {
                                    stats.swept.fetch_add(queued as u64, Ordering::Relaxed);
                                    log::info!("Sweep queued {} runs", queued);
                                }
                                Err(e) => log::warn!("Queue sweep failed: {}", e),
                            }
                        }
                        _ = sweep_shutdown_rx.recv() => break,
                    }
                }
            })
        });

        loop {
            let woken = self.queue.notified();

            for run in self.queue.pop_due(self.clock.now())? {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| CadenceError::Queue(e.to_string()))?;
                let handler = Arc::clone(&self.handler);
                self.stats.started.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(job_id = %run.id, wait_until = %run.wait_until, "dispatching job");
                tasks.spawn(async move {
                    handler.handle(run).await;
                    drop(permit);
                });
            }

            while let Some(joined) = tasks.try_join_next() {
                self.reap(joined);
            }

            let sleep_for = self.sleep_duration();
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = woken => {}
                _ = shutdown_rx.recv() => {
                    log::info!("Worker shutting down, waiting for {} running jobs", tasks.len());
                    break;
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.reap(joined);
        }
        if let Some(handle) = sweep_task {
            if let Err(e) = handle.await {
                log::error!("Sweep task failed: {}", e);
            }
        }
        log::info!("Worker stopped after {} jobs", self.stats.started());
        Ok(())
    }

    fn reap(&self, joined: std::result::Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            self.stats.panicked.fetch_add(1, Ordering::Relaxed);
            log::error!("Job task failed: {}", e);
        }
    }

    fn sleep_duration(&self) -> Duration {
        match self.queue.next_due_at() {
            Some(due) => (due - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(self.config.max_idle),
            None => self.config.max_idle,
        }
    }
}
