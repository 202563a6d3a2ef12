//! Ingestion path: validate, sequence, enqueue
//!
//! Runs once per inbound request and is safe under any number of concurrent
//! callers. Validation happens before the sequencer is touched, so rejected
//! events never consume a sequence number. Sequencing and the queue append
//! run under one ordering gate, which keeps queue order identical to sequence
//! order; the persistence worker therefore commits in sequence order and the
//! committed high-water mark never jumps over an event still in flight.
//! Ingestion throughput per process is bounded by one sequencer round-trip
//! plus one queue round-trip per event.
//!
//! A call cancelled after `next()` but before the push completes leaves a
//! permanent gap in the sequence.

use crate::domain::RawLogEvent;
use crate::error::{LogHookError, Result};
use crate::persistence::{DurableQueue, PersistenceWorker, Sequencer};
use crate::services::IngestMetrics;
use crate::validation::validate_event;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Where an accepted event stands when the ingest call returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Durably queued, persistence pending
    Enqueued,
    /// Committed to the relational store
    Persisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub status: IngestStatus,
    pub sequence_id: i64,
}

pub struct IngestService {
    sequencer: Arc<dyn Sequencer>,
    queue: Arc<dyn DurableQueue>,
    worker: Arc<PersistenceWorker>,
    metrics: Arc<IngestMetrics>,
    order: Mutex<()>,
    persist_inline: bool,
}

impl IngestService {
    pub fn new(
        sequencer: Arc<dyn Sequencer>,
        queue: Arc<dyn DurableQueue>,
        worker: Arc<PersistenceWorker>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            sequencer,
            queue,
            worker,
            metrics,
            order: Mutex::new(()),
            persist_inline: false,
        }
    }

    /// Drain through each accepted event before returning
    pub fn with_persist_inline(mut self, persist_inline: bool) -> Self {
        self.persist_inline = persist_inline;
        self
    }

    /// Accept one event
    ///
    /// # Errors
    /// * `Validation` - bad input, nothing consumed
    /// * `Unavailable` - sequencer or queue unreachable; safe to retry
    #[instrument(skip(self, raw))]
    pub async fn ingest(&self, raw: RawLogEvent) -> Result<IngestReceipt> {
        let sequence_id = self.enqueue(raw).await?;
        self.worker.notify();
        let status = self.settle().await;

        Ok(IngestReceipt {
            status,
            sequence_id,
        })
    }

    /// Accept several events, each validated and sequenced independently
    ///
    /// Results are positional; a rejected item does not affect the others.
    pub async fn ingest_batch(&self, raws: Vec<RawLogEvent>) -> Vec<Result<IngestReceipt>> {
        let mut results = Vec::with_capacity(raws.len());
        for raw in raws {
            results.push(self.enqueue(raw).await);
        }

        let status = if results.iter().any(Result::is_ok) {
            self.worker.notify();
            self.settle().await
        } else {
            IngestStatus::Enqueued
        };

        results
            .into_iter()
            .map(|r| r.map(|sequence_id| IngestReceipt { status, sequence_id }))
            .collect()
    }

    async fn enqueue(&self, raw: RawLogEvent) -> Result<i64> {
        let normalized = validate_event(raw).map_err(|errors| {
            self.metrics.inc_rejected();
            debug!("Rejected event: {}", errors);
            LogHookError::Validation(errors)
        })?;

        let order = self.order.lock().await;

        let sequence_id = self
            .sequencer
            .next()
            .await
            .map_err(|e| self.unavailable(e))?;

        let event = normalized.into_sequenced(sequence_id, Utc::now());
        self.queue
            .push(&event)
            .await
            .map_err(|e| self.unavailable(e))?;

        drop(order);
        self.metrics.inc_accepted();
        debug!("Enqueued event {} from {}", sequence_id, event.source);

        Ok(sequence_id)
    }

    async fn settle(&self) -> IngestStatus {
        if !self.persist_inline {
            return IngestStatus::Enqueued;
        }
        match self.worker.drain().await {
            Ok(_) => IngestStatus::Persisted,
            Err(e) => {
                // Still queued; the background loop retries it
                warn!("Inline persistence failed, event stays queued: {}", e);
                IngestStatus::Enqueued
            }
        }
    }

    fn unavailable(&self, err: LogHookError) -> LogHookError {
        self.metrics.inc_unavailable();
        match err {
            LogHookError::Unavailable(_) => err,
            other => LogHookError::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryLogStore, MemoryQueue, MemorySequencer};
    use crate::persistence::sequencer::MockSequencer;
    use crate::persistence::{LogRepository, PersistenceWorkerConfig};
    use serde_json::json;

    struct Harness {
        sequencer: Arc<MemorySequencer>,
        queue: Arc<MemoryQueue>,
        store: Arc<MemoryLogStore>,
        metrics: Arc<IngestMetrics>,
        service: Arc<IngestService>,
    }

    fn harness(persist_inline: bool) -> Harness {
        let sequencer = Arc::new(MemorySequencer::new());
        let queue = Arc::new(MemoryQueue::new());
        let store = Arc::new(MemoryLogStore::new());
        let metrics = Arc::new(IngestMetrics::new());
        let worker = Arc::new(PersistenceWorker::new(
            PersistenceWorkerConfig::default(),
            queue.clone(),
            store.clone(),
            metrics.clone(),
        ));
        let service = Arc::new(
            IngestService::new(sequencer.clone(), queue.clone(), worker, metrics.clone())
                .with_persist_inline(persist_inline),
        );
        Harness {
            sequencer,
            queue,
            store,
            metrics,
            service,
        }
    }

    #[tokio::test]
    async fn test_ingest_enqueues_with_sequence() {
        let h = harness(false);

        let receipt = h
            .service
            .ingest(RawLogEvent::new("info", "hello", "app"))
            .await
            .unwrap();

        assert_eq!(receipt.status, IngestStatus::Enqueued);
        assert_eq!(receipt.sequence_id, 1);
        let queued = h.queue.peek_batch(10).await.unwrap();
        assert_eq!(queued[0].event.level, "INFO");
        assert_eq!(queued[0].event.sequence_id, 1);
    }

    #[tokio::test]
    async fn test_rejected_event_never_reaches_sequencer() {
        let mut sequencer = MockSequencer::new();
        sequencer.expect_next().never();
        let queue = Arc::new(MemoryQueue::new());
        let metrics = Arc::new(IngestMetrics::new());
        let worker = Arc::new(PersistenceWorker::new(
            PersistenceWorkerConfig::default(),
            queue.clone(),
            Arc::new(MemoryLogStore::new()),
            metrics.clone(),
        ));
        let service = IngestService::new(Arc::new(sequencer), queue.clone(), worker, metrics);

        let raw: RawLogEvent =
            serde_json::from_value(json!({"level": 123, "message": "test", "source": "app"}))
                .unwrap();
        let err = service.ingest(raw).await.unwrap_err();

        match err {
            LogHookError::Validation(errors) => assert_eq!(errors.fields(), vec!["level"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejection_leaves_counter_unchanged() {
        let h = harness(false);
        h.service
            .ingest(RawLogEvent::new("info", "a", "app"))
            .await
            .unwrap();

        let before = h.sequencer.current().await.unwrap();
        let result = h.service.ingest(RawLogEvent::new("info", "", "app")).await;
        let after = h.sequencer.current().await.unwrap();

        assert!(result.is_err());
        assert_eq!(before, after);
        assert_eq!(h.metrics.snapshot().rejected, 1);
    }

    #[tokio::test]
    async fn test_unavailable_sequencer_queues_nothing() {
        let h = harness(false);
        h.sequencer.set_unavailable(true);

        let err = h
            .service
            .ingest(RawLogEvent::new("info", "a", "app"))
            .await
            .unwrap_err();

        assert!(matches!(err, LogHookError::Unavailable(_)));
        assert_eq!(h.queue.len().await.unwrap(), 0);
        assert_eq!(h.metrics.snapshot().unavailable, 1);

        h.sequencer.set_unavailable(false);
        let receipt = h
            .service
            .ingest(RawLogEvent::new("info", "a", "app"))
            .await
            .unwrap();
        assert_eq!(receipt.sequence_id, 1);
    }

    #[tokio::test]
    async fn test_failed_push_leaves_gap() {
        let h = harness(false);
        h.queue.set_unavailable(true);
        assert!(h
            .service
            .ingest(RawLogEvent::new("info", "lost", "app"))
            .await
            .is_err());

        h.queue.set_unavailable(false);
        let receipt = h
            .service
            .ingest(RawLogEvent::new("info", "kept", "app"))
            .await
            .unwrap();

        assert_eq!(receipt.sequence_id, 2);
    }

    #[tokio::test]
    async fn test_concurrent_ingest_is_unique_and_ordered() {
        let h = harness(false);

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let service = h.service.clone();
                tokio::spawn(async move {
                    service
                        .ingest(RawLogEvent::new("info", &format!("event {i}"), "load"))
                        .await
                        .unwrap()
                        .sequence_id
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 64);

        // Queue order follows sequence order
        let queued: Vec<i64> = h
            .queue
            .peek_batch(100)
            .await
            .unwrap()
            .iter()
            .map(|q| q.event.sequence_id)
            .collect();
        assert!(queued.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_persist_inline_reports_persisted() {
        let h = harness(true);

        let receipt = h
            .service
            .ingest(RawLogEvent::new("error", "boom", "app"))
            .await
            .unwrap();

        assert_eq!(receipt.status, IngestStatus::Persisted);
        assert_eq!(h.store.high_water_mark().await.unwrap(), receipt.sequence_id);
        assert_eq!(h.queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persist_inline_falls_back_to_enqueued() {
        let h = harness(true);
        h.store.set_unavailable(true);

        let receipt = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            h.service.ingest(RawLogEvent::new("error", "boom", "app")),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(receipt.status, IngestStatus::Enqueued);
        assert_eq!(h.queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_results_are_positional() {
        let h = harness(false);

        let results = h
            .service
            .ingest_batch(vec![
                RawLogEvent::new("info", "one", "app"),
                RawLogEvent::default(),
                RawLogEvent::new("warn", "two", "app"),
            ])
            .await;

        assert_eq!(results[0].as_ref().unwrap().sequence_id, 1);
        assert!(matches!(results[1], Err(LogHookError::Validation(_))));
        assert_eq!(results[2].as_ref().unwrap().sequence_id, 2);
    }
}
