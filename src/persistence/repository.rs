//! Relational store for persisted events and checkpoints

use crate::domain::{Checkpoint, PersistedLogEvent, SequencedLogEvent};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

#[async_trait]
pub trait LogRepository: Send + Sync {
    /// Write a batch in a single transaction, ignoring rows whose
    /// `sequence_id` already exists. Returns the number of new rows.
    ///
    /// On failure nothing from the batch is visible.
    async fn insert_batch(&self, events: &[SequencedLogEvent]) -> Result<u64>;

    /// Highest committed `sequence_id`, 0 when the store is empty
    async fn high_water_mark(&self) -> Result<i64>;

    /// Record a checkpoint whose `last_sequence` is the committed
    /// high-water mark read in the same transaction as the insert
    async fn create_checkpoint(&self, checkpoint_id: &str) -> Result<Checkpoint>;

    async fn get_checkpoint(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>>;

    /// Most recent checkpoints first
    async fn list_checkpoints(&self, limit: i64) -> Result<Vec<Checkpoint>>;

    /// Committed events with `sequence_id > after`, ascending
    async fn events_after(&self, after: i64, limit: Option<i64>)
        -> Result<Vec<PersistedLogEvent>>;

    /// Cursor over committed events with `sequence_id > after`, ascending
    fn stream_events_after(&self, after: i64) -> BoxStream<'_, Result<PersistedLogEvent>>;

    /// Round-trip to the store
    async fn ping(&self) -> Result<()>;
}
