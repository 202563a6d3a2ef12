//! In-process backends for tests and `--memory` runs
//!
//! Nothing here survives a restart. Each backend can be told to fail so the
//! unavailable and commit-failure paths are reachable without a database.

use crate::domain::{Checkpoint, PersistedLogEvent, QueuedEvent, SequencedLogEvent};
use crate::error::{LogHookError, Result};
use crate::persistence::{DrainLease, DurableQueue, LogRepository, Sequencer};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

fn unavailable(component: &str) -> LogHookError {
    LogHookError::Unavailable(format!("{} backing store unreachable", component))
}

// ==================== Sequencer ====================

/// Atomic counter sequencer
#[derive(Debug, Default)]
pub struct MemorySequencer {
    value: AtomicI64,
    unavailable: AtomicBool,
}

impl MemorySequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a previously issued value, as after a restart
    pub fn starting_at(value: i64) -> Self {
        Self {
            value: AtomicI64::new(value),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl Sequencer for MemorySequencer {
    async fn next(&self) -> Result<i64> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable("sequencer"));
        }
        Ok(self.value.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn current(&self) -> Result<i64> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable("sequencer"));
        }
        Ok(self.value.load(Ordering::SeqCst))
    }
}

// ==================== Queue ====================

#[derive(Debug, Default)]
struct QueueState {
    next_entry_id: i64,
    entries: VecDeque<QueuedEvent>,
}

/// FIFO queue with reserve-then-acknowledge semantics
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    // Shared by every worker built over this queue
    lease: Arc<Mutex<()>>,
    unavailable: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(unavailable("queue"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
    async fn push(&self, event: &SequencedLogEvent) -> Result<i64> {
        self.check()?;
        let mut state = self.state.lock().await;
        state.next_entry_id += 1;
        let entry_id = state.next_entry_id;
        state.entries.push_back(QueuedEvent {
            entry_id,
            event: event.clone(),
        });
        Ok(entry_id)
    }

    async fn peek_batch(&self, limit: usize) -> Result<Vec<QueuedEvent>> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state.entries.iter().take(limit).cloned().collect())
    }

    async fn ack(&self, entry_ids: &[i64]) -> Result<u64> {
        self.check()?;
        let mut state = self.state.lock().await;
        let before = state.entries.len();
        state.entries.retain(|q| !entry_ids.contains(&q.entry_id));
        Ok((before - state.entries.len()) as u64)
    }

    async fn len(&self) -> Result<u64> {
        self.check()?;
        Ok(self.state.lock().await.entries.len() as u64)
    }

    async fn acquire_drain_lease(&self) -> Result<DrainLease> {
        self.check()?;
        Ok(DrainLease::new(self.lease.clone().lock_owned().await))
    }

    async fn try_acquire_drain_lease(&self) -> Result<Option<DrainLease>> {
        self.check()?;
        Ok(self.lease.clone().try_lock_owned().ok().map(DrainLease::new))
    }
}

// ==================== Relational store ====================

#[derive(Debug, Default)]
struct StoreState {
    logs: BTreeMap<i64, PersistedLogEvent>,
    checkpoints: Vec<Checkpoint>,
}

/// Log and checkpoint tables keyed like the relational schema
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    state: Mutex<StoreState>,
    failing_commits: AtomicU32,
    unavailable: AtomicBool,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` batch commits fail without writing anything
    pub fn fail_next_commits(&self, count: u32) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(LogHookError::TransientStorage(
                "log store unreachable".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LogRepository for MemoryLogStore {
    async fn insert_batch(&self, events: &[SequencedLogEvent]) -> Result<u64> {
        self.check()?;
        if self.take_injected_failure() {
            return Err(LogHookError::TransientStorage(
                "injected commit failure".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        let mut inserted = 0;
        for event in events {
            if !state.logs.contains_key(&event.sequence_id) {
                state.logs.insert(event.sequence_id, event.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn high_water_mark(&self) -> Result<i64> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state.logs.keys().next_back().copied().unwrap_or(0))
    }

    async fn create_checkpoint(&self, checkpoint_id: &str) -> Result<Checkpoint> {
        self.check()?;
        // One lock covers the mark read and the insert, like the SQL transaction
        let mut state = self.state.lock().await;
        if state
            .checkpoints
            .iter()
            .any(|c| c.checkpoint_id == checkpoint_id)
        {
            return Err(LogHookError::Internal(format!(
                "checkpoint id {} already exists",
                checkpoint_id
            )));
        }

        let checkpoint = Checkpoint {
            checkpoint_id: checkpoint_id.to_string(),
            last_sequence: state.logs.keys().next_back().copied().unwrap_or(0),
            created_at: Utc::now(),
        };
        state.checkpoints.push(checkpoint.clone());
        Ok(checkpoint)
    }

    async fn get_checkpoint(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state
            .checkpoints
            .iter()
            .find(|c| c.checkpoint_id == checkpoint_id)
            .cloned())
    }

    async fn list_checkpoints(&self, limit: i64) -> Result<Vec<Checkpoint>> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state
            .checkpoints
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn events_after(
        &self,
        after: i64,
        limit: Option<i64>,
    ) -> Result<Vec<PersistedLogEvent>> {
        self.check()?;
        let state = self.state.lock().await;
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(state
            .logs
            .range(after.saturating_add(1)..)
            .map(|(_, e)| e.clone())
            .take(limit)
            .collect())
    }

    fn stream_events_after(&self, after: i64) -> BoxStream<'_, Result<PersistedLogEvent>> {
        stream::once(async move { self.events_after(after, None).await })
            .map(|page| match page {
                Ok(events) => stream::iter(events.into_iter().map(Ok)).left_stream(),
                Err(e) => stream::iter(vec![Err(e)]).right_stream(),
            })
            .flatten()
            .boxed()
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}
