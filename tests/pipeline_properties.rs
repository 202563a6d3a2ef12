use async_trait::async_trait;
use futures::TryStreamExt;
use loghook::adapters::{MemoryLogStore, MemoryQueue, MemorySequencer};
use loghook::domain::{QueuedEvent, SequencedLogEvent};
use loghook::persistence::{DrainLease, DurableQueue, LogRepository, Sequencer};
use loghook::{AppConfig, LogHookError, Pipeline, RawLogEvent};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Backends {
    sequencer: Arc<MemorySequencer>,
    queue: Arc<MemoryQueue>,
    store: Arc<MemoryLogStore>,
}

impl Backends {
    fn new() -> Self {
        Self {
            sequencer: Arc::new(MemorySequencer::new()),
            queue: Arc::new(MemoryQueue::new()),
            store: Arc::new(MemoryLogStore::new()),
        }
    }

    /// A fresh process over the same durable state
    fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.sequencer.clone(),
            self.queue.clone(),
            self.store.clone(),
            &fast_config(),
        )
    }
}

/// Tracks how many reservations are outstanding at once
struct ReservationTracker {
    inner: Arc<MemoryQueue>,
    outstanding: AtomicUsize,
    peak: AtomicUsize,
}

impl ReservationTracker {
    fn new(inner: Arc<MemoryQueue>) -> Self {
        Self {
            inner,
            outstanding: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DurableQueue for ReservationTracker {
    async fn push(&self, event: &SequencedLogEvent) -> loghook::Result<i64> {
        self.inner.push(event).await
    }

    async fn peek_batch(&self, limit: usize) -> loghook::Result<Vec<QueuedEvent>> {
        let batch = self.inner.peek_batch(limit).await?;
        if !batch.is_empty() {
            let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            // Leave room for a competing consumer to interleave
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        Ok(batch)
    }

    async fn ack(&self, entry_ids: &[i64]) -> loghook::Result<u64> {
        let removed = self.inner.ack(entry_ids).await?;
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        Ok(removed)
    }

    async fn len(&self) -> loghook::Result<u64> {
        self.inner.len().await
    }

    async fn acquire_drain_lease(&self) -> loghook::Result<DrainLease> {
        self.inner.acquire_drain_lease().await
    }

    async fn try_acquire_drain_lease(&self) -> loghook::Result<Option<DrainLease>> {
        self.inner.try_acquire_drain_lease().await
    }
}

fn fast_config() -> AppConfig {
    let mut config = AppConfig::local(None);
    config.queue.batch_size = 4;
    config.worker.base_backoff_ms = 1;
    config.worker.max_backoff_ms = 5;
    config.worker.max_retries = 2;
    config
}

fn event(n: usize) -> RawLogEvent {
    RawLogEvent::new("info", &format!("event {n}"), "tests")
        .with_metadata(json!({"n": n}))
}

async fn ingest_n(pipeline: &Pipeline, n: usize) -> Vec<i64> {
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        ids.push(pipeline.ingest.ingest(event(i)).await.unwrap().sequence_id);
    }
    ids
}

async fn replayed_ids(pipeline: &Pipeline, checkpoint_id: &str) -> Vec<i64> {
    pipeline
        .replay
        .replay(checkpoint_id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.sequence_id)
        .collect()
}

#[tokio::test]
async fn concurrent_ingestion_yields_distinct_increasing_ids() {
    let backends = Backends::new();
    let pipeline = backends.pipeline();

    let handles: Vec<_> = (0..200)
        .map(|i| {
            let ingest = pipeline.ingest.clone();
            tokio::spawn(async move { ingest.ingest(event(i)).await.unwrap().sequence_id })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }

    let distinct: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(distinct.len(), 200);
    ids.sort_unstable();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn rejected_event_does_not_advance_sequencer() {
    let backends = Backends::new();
    let pipeline = backends.pipeline();
    ingest_n(&pipeline, 3).await;

    let before = backends.sequencer.current().await.unwrap();
    let raw: RawLogEvent =
        serde_json::from_value(json!({"level": "info", "message": "", "source": 5})).unwrap();
    let err = pipeline.ingest.ingest(raw).await.unwrap_err();
    let after = backends.sequencer.current().await.unwrap();

    match err {
        LogHookError::Validation(errors) => {
            assert_eq!(errors.fields(), vec!["message", "source"]);
        }
        other => panic!("expected validation error, got {other}"),
    }
    assert_eq!(before, after);
    assert_eq!(backends.queue.len().await.unwrap(), 3);
}

#[tokio::test]
async fn drain_persists_every_queued_event_once() {
    let backends = Backends::new();
    let pipeline = backends.pipeline();
    let ids = ingest_n(&pipeline, 17).await;

    let report = pipeline.worker.drain().await.unwrap();

    assert_eq!(report.persisted, 17);
    assert_eq!(report.batches, 5);
    let rows = backends.store.events_after(0, None).await.unwrap();
    assert_eq!(rows.iter().map(|e| e.sequence_id).collect::<Vec<_>>(), ids);
    assert_eq!(rows[3].level, "INFO");
    assert_eq!(rows[3].metadata["n"], json!(3));
    assert_eq!(backends.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn checkpoint_then_replay_returns_only_later_events() {
    let backends = Backends::new();
    let pipeline = backends.pipeline();

    ingest_n(&pipeline, 5).await;
    pipeline.worker.drain().await.unwrap();
    let checkpoint = pipeline.checkpoints.create().await.unwrap();
    assert_eq!(checkpoint.last_sequence, 5);

    ingest_n(&pipeline, 2).await;
    pipeline.worker.drain().await.unwrap();

    assert_eq!(replayed_ids(&pipeline, &checkpoint.checkpoint_id).await, vec![6, 7]);
}

#[tokio::test]
async fn checkpoint_ignores_events_not_yet_persisted() {
    let backends = Backends::new();
    let pipeline = backends.pipeline();

    ingest_n(&pipeline, 2).await;
    pipeline.worker.drain().await.unwrap();
    // Sequenced and queued, not committed
    ingest_n(&pipeline, 3).await;

    let checkpoint = pipeline.checkpoints.create().await.unwrap();
    assert_eq!(checkpoint.last_sequence, 2);
    assert_eq!(backends.sequencer.current().await.unwrap(), 5);

    pipeline.worker.drain().await.unwrap();
    assert_eq!(
        replayed_ids(&pipeline, &checkpoint.checkpoint_id).await,
        vec![3, 4, 5]
    );
}

#[tokio::test]
async fn replay_is_idempotent_without_new_persistence() {
    let backends = Backends::new();
    let pipeline = backends.pipeline();
    let checkpoint = pipeline.checkpoints.create().await.unwrap();
    ingest_n(&pipeline, 6).await;
    pipeline.worker.drain().await.unwrap();

    let first = pipeline.replay.replay(&checkpoint.checkpoint_id).await.unwrap();
    // Queued but undrained events must not change the answer
    ingest_n(&pipeline, 2).await;
    let second = pipeline.replay.replay(&checkpoint.checkpoint_id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 6);
}

#[tokio::test]
async fn failed_commit_keeps_batch_for_next_reservation() {
    let backends = Backends::new();
    let pipeline = backends.pipeline();
    ingest_n(&pipeline, 3).await;
    backends.store.fail_next_commits(100);

    let err = pipeline.worker.drain().await.unwrap_err();
    assert!(matches!(err, LogHookError::TransientStorage(_)));

    let reserved = backends.queue.peek_batch(10).await.unwrap();
    assert_eq!(
        reserved.iter().map(|q| q.event.sequence_id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(backends.store.high_water_mark().await.unwrap(), 0);

    // Restarted process over the same queue and store
    backends.store.fail_next_commits(0);
    let restarted = backends.pipeline();
    let report = restarted.worker.drain().await.unwrap();
    assert_eq!(report.persisted, 3);
    assert_eq!(backends.store.events_after(0, None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn separate_workers_over_one_queue_never_overlap() {
    let backends = Backends::new();
    let queue = Arc::new(ReservationTracker::new(backends.queue.clone()));
    // A serving process and a one-shot drain command over the same queue
    let serving = Pipeline::new(
        backends.sequencer.clone(),
        queue.clone(),
        backends.store.clone(),
        &fast_config(),
    );
    let one_shot = Pipeline::new(
        backends.sequencer.clone(),
        queue.clone(),
        backends.store.clone(),
        &fast_config(),
    );
    ingest_n(&serving, 20).await;

    let (a, b) = tokio::join!(serving.worker.drain(), one_shot.worker.drain());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(queue.peak(), 1);
    assert_eq!(a.persisted + b.persisted, 20);
    assert_eq!(a.redelivered + b.redelivered, 0);
    assert_eq!(backends.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn sequence_survives_restart() {
    let backends = Backends::new();
    ingest_n(&backends.pipeline(), 4).await;

    let resumed = Arc::new(MemorySequencer::starting_at(
        backends.sequencer.current().await.unwrap(),
    ));
    let pipeline = Pipeline::new(
        resumed,
        backends.queue.clone(),
        backends.store.clone(),
        &fast_config(),
    );

    let receipt = pipeline.ingest.ingest(event(99)).await.unwrap();
    assert_eq!(receipt.sequence_id, 5);
}

#[tokio::test]
async fn unknown_checkpoint_is_not_an_empty_replay() {
    let pipeline = Backends::new().pipeline();

    let err = pipeline.replay.replay("does-not-exist").await.unwrap_err();
    assert!(matches!(err, LogHookError::CheckpointNotFound(id) if id == "does-not-exist"));
}

#[tokio::test]
async fn checkpoints_are_monotonic_and_listed_newest_first() {
    let backends = Backends::new();
    let pipeline = backends.pipeline();

    let mut created = Vec::new();
    for _ in 0..3 {
        ingest_n(&pipeline, 2).await;
        pipeline.worker.drain().await.unwrap();
        created.push(pipeline.checkpoints.create().await.unwrap());
    }

    assert_eq!(
        created.iter().map(|c| c.last_sequence).collect::<Vec<_>>(),
        vec![2, 4, 6]
    );
    let listed = pipeline.checkpoints.list(None).await.unwrap();
    assert_eq!(listed[0].checkpoint_id, created[2].checkpoint_id);
    assert_eq!(listed.len(), 3);
}

#[tokio::test]
async fn streamed_and_paged_replay_agree() {
    let backends = Backends::new();
    let pipeline = backends.pipeline();
    let checkpoint = pipeline.checkpoints.create().await.unwrap();
    ingest_n(&pipeline, 9).await;
    pipeline.worker.drain().await.unwrap();

    let streamed: Vec<i64> = pipeline
        .replay
        .replay_stream(&checkpoint.checkpoint_id)
        .await
        .unwrap()
        .map_ok(|e| e.sequence_id)
        .try_collect()
        .await
        .unwrap();

    let mut paged = Vec::new();
    let mut cursor = None;
    loop {
        let page = pipeline
            .replay
            .replay_page(&checkpoint.checkpoint_id, cursor, 4)
            .await
            .unwrap();
        paged.extend(page.events.iter().map(|e| e.sequence_id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(streamed, (1..=9).collect::<Vec<_>>());
    assert_eq!(paged, streamed);
}
