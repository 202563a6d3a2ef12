//! Persistence Worker
//!
//! Drains the durable queue into the relational store, one batch per
//! transaction, acknowledging entries only after their commit succeeded.
//! Exactly one drain runs at a time. Within a process, overlapping triggers
//! (per-ingest notifications, the interval timer, inline persistence) queue
//! on a single-flight gate. Across processes, say `serve` next to
//! `loghook drain`, every pass also holds the queue's drain lease, so two
//! workers never reserve the same entries.

use crate::config::{QueueConfig, WorkerConfig};
use crate::error::{LogHookError, Result};
use crate::persistence::{DurableQueue, LogRepository};
use crate::services::IngestMetrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, MutexGuard, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for the persistence worker
#[derive(Debug, Clone)]
pub struct PersistenceWorkerConfig {
    /// Maximum entries reserved per batch (default: 100)
    pub batch_size: usize,
    /// Interval between scheduled drains (default: 1s)
    pub interval: Duration,
    /// Base delay for exponential backoff (default: 100ms)
    pub base_backoff: Duration,
    /// Maximum backoff delay (default: 30s)
    pub max_backoff: Duration,
    /// Failed commits tolerated within one drain (default: 5)
    pub max_retries: u32,
}

impl Default for PersistenceWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            interval: Duration::from_secs(1),
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

impl PersistenceWorkerConfig {
    pub fn from_config(queue: &QueueConfig, worker: &WorkerConfig) -> Self {
        Self {
            batch_size: queue.batch_size,
            interval: Duration::from_millis(worker.interval_ms),
            base_backoff: Duration::from_millis(worker.base_backoff_ms),
            max_backoff: Duration::from_millis(worker.max_backoff_ms),
            max_retries: worker.max_retries,
        }
    }

    fn backoff_duration(&self, retry_count: u32) -> Duration {
        let delay = self
            .base_backoff
            .saturating_mul(2u32.saturating_pow(retry_count));
        delay.min(self.max_backoff)
    }
}

/// Result of processing one reserved batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing pending
    Empty,
    /// Batch committed and acknowledged
    Committed {
        /// Entries acknowledged
        events: u64,
        /// Rows newly written (less than `events` on redelivery)
        inserted: u64,
    },
    /// Commit failed; the batch stays in the queue
    Failed { error: String },
}

/// Summary of a drain run to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub batches: u64,
    pub persisted: u64,
    pub redelivered: u64,
    pub failures: u64,
}

/// Worker statistics
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    pub drains: u64,
    pub batches_committed: u64,
    pub commit_failures: u64,
    pub last_drain: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Single-consumer drain of the durable queue
pub struct PersistenceWorker {
    config: PersistenceWorkerConfig,
    queue: Arc<dyn DurableQueue>,
    repository: Arc<dyn LogRepository>,
    metrics: Arc<IngestMetrics>,
    flight: Mutex<()>,
    wakeup: Notify,
    stats: RwLock<WorkerStats>,
}

impl PersistenceWorker {
    pub fn new(
        config: PersistenceWorkerConfig,
        queue: Arc<dyn DurableQueue>,
        repository: Arc<dyn LogRepository>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            config,
            queue,
            repository,
            metrics,
            flight: Mutex::new(()),
            wakeup: Notify::new(),
            stats: RwLock::new(WorkerStats::default()),
        }
    }

    /// Ask the running loop for an opportunistic drain
    pub fn notify(&self) {
        self.wakeup.notify_one();
    }

    pub async fn stats(&self) -> WorkerStats {
        self.stats.read().await.clone()
    }

    /// Drain until the queue is empty, waiting for any drain already in flight
    ///
    /// Failed commits are retried with exponential backoff; after
    /// `max_retries` consecutive failures the drain stops with
    /// `TransientStorage` and the unacknowledged batch stays queued.
    pub async fn drain(&self) -> Result<DrainReport> {
        let flight = self.flight.lock().await;
        let _lease = self.queue.acquire_drain_lease().await?;
        self.drain_locked(&flight).await
    }

    /// Drain only if no other drain, local or remote, is active; `None` when skipped
    pub async fn try_drain(&self) -> Option<Result<DrainReport>> {
        let flight = self.flight.try_lock().ok()?;
        let _lease = match self.queue.try_acquire_drain_lease().await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                debug!("Queue is being drained by another consumer");
                return None;
            }
            Err(e) => return Some(Err(e)),
        };
        Some(self.drain_locked(&flight).await)
    }

    /// Reserve, commit and acknowledge a single batch
    pub async fn run_once(&self) -> Result<BatchOutcome> {
        let flight = self.flight.lock().await;
        let _lease = self.queue.acquire_drain_lease().await?;
        self.process_batch(&flight).await
    }

    async fn drain_locked(&self, flight: &MutexGuard<'_, ()>) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        let mut attempt = 0u32;

        let result = loop {
            match self.process_batch(flight).await {
                Ok(BatchOutcome::Empty) => break Ok(()),
                Ok(BatchOutcome::Committed { events, inserted }) => {
                    attempt = 0;
                    report.batches += 1;
                    report.persisted += inserted;
                    report.redelivered += events.saturating_sub(inserted);
                }
                Ok(BatchOutcome::Failed { error }) => {
                    report.failures += 1;
                    if attempt >= self.config.max_retries {
                        break Err(LogHookError::TransientStorage(format!(
                            "giving up after {} failed commits: {}",
                            report.failures, error
                        )));
                    }
                    let delay = self.config.backoff_duration(attempt);
                    warn!(
                        "Batch commit failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        error
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break Err(e),
            }
        };

        let mut stats = self.stats.write().await;
        stats.drains += 1;
        stats.batches_committed += report.batches;
        stats.commit_failures += report.failures;
        stats.last_drain = Some(Utc::now());
        if let Err(ref e) = result {
            stats.last_error = Some(e.to_string());
        }
        drop(stats);

        result.map(|()| {
            if report.batches > 0 {
                debug!(
                    "Drain complete: {} batches, {} persisted, {} redelivered",
                    report.batches, report.persisted, report.redelivered
                );
            }
            report
        })
    }

    // Only reachable with the flight guard and the drain lease held.
    async fn process_batch(&self, _flight: &MutexGuard<'_, ()>) -> Result<BatchOutcome> {
        let batch = self.queue.peek_batch(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(BatchOutcome::Empty);
        }

        let entry_ids: Vec<i64> = batch.iter().map(|q| q.entry_id).collect();
        let events: Vec<_> = batch.into_iter().map(|q| q.event).collect();

        let inserted = match self.repository.insert_batch(&events).await {
            Ok(inserted) => inserted,
            Err(e) => {
                self.metrics.inc_commit_failures();
                let mut stats = self.stats.write().await;
                stats.last_error = Some(e.to_string());
                return Ok(BatchOutcome::Failed {
                    error: e.to_string(),
                });
            }
        };

        // Rows are committed; a failed ack only means redelivery, which the
        // idempotent insert absorbs.
        self.queue.ack(&entry_ids).await?;
        self.metrics.add_persisted(inserted);

        debug!(
            "Committed batch of {} events ({} new rows)",
            events.len(),
            inserted
        );

        Ok(BatchOutcome::Committed {
            events: events.len() as u64,
            inserted,
        })
    }

    /// Run the drain loop until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Persistence worker started (interval: {:?}, batch size: {})",
            self.config.interval, self.config.batch_size
        );

        let mut timer = tokio::time::interval(self.config.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                _ = self.wakeup.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            if let Err(e) = self.drain().await {
                error!("Persistence drain failed: {}", e);
            }
        }

        // Final pass so a clean shutdown leaves nothing behind
        match self.drain().await {
            Ok(report) => info!(
                "Persistence worker stopped ({} events persisted in final drain)",
                report.persisted
            ),
            Err(e) => warn!("Persistence worker stopped with pending entries: {}", e),
        }
    }

    /// Spawn the drain loop on the runtime
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
