//! Replay Service
//!
//! Returns every persisted event strictly after a checkpoint's recorded
//! sequence, ascending. Reads only committed rows, so repeated calls with no
//! persistence in between return identical results.

use crate::domain::{Checkpoint, PersistedLogEvent};
use crate::error::Result;
use crate::persistence::{CheckpointManager, LogRepository};
use futures::stream::BoxStream;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Upper bound on a single replay page
pub const MAX_PAGE_SIZE: i64 = 10_000;

/// One page of a cursor-driven replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayPage {
    pub checkpoint: Checkpoint,
    pub events: Vec<PersistedLogEvent>,
    /// Pass back as `after` to fetch the next page; `None` when exhausted
    pub next_cursor: Option<i64>,
}

pub struct ReplayService {
    checkpoints: Arc<CheckpointManager>,
    repository: Arc<dyn LogRepository>,
}

impl ReplayService {
    pub fn new(checkpoints: Arc<CheckpointManager>, repository: Arc<dyn LogRepository>) -> Self {
        Self {
            checkpoints,
            repository,
        }
    }

    /// All events after the checkpoint, fully materialized
    pub async fn replay(&self, checkpoint_id: &str) -> Result<Vec<PersistedLogEvent>> {
        let checkpoint = self.checkpoints.get(checkpoint_id).await?;
        let events = self
            .repository
            .events_after(checkpoint.last_sequence, None)
            .await?;

        debug!(
            "Replayed {} events after checkpoint {} (sequence {})",
            events.len(),
            checkpoint_id,
            checkpoint.last_sequence
        );
        Ok(events)
    }

    /// A bounded page of the replay, resuming after `cursor` when given
    ///
    /// A cursor at or below the checkpoint's mark is ignored; the page never
    /// reaches back before the checkpoint.
    pub async fn replay_page(
        &self,
        checkpoint_id: &str,
        cursor: Option<i64>,
        limit: i64,
    ) -> Result<ReplayPage> {
        let checkpoint = self.checkpoints.get(checkpoint_id).await?;
        let after = cursor
            .map(|c| c.max(checkpoint.last_sequence))
            .unwrap_or(checkpoint.last_sequence);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        let events = self.repository.events_after(after, Some(limit)).await?;
        let next_cursor = if events.len() as i64 == limit {
            events.last().map(|e| e.sequence_id)
        } else {
            None
        };

        Ok(ReplayPage {
            checkpoint,
            events,
            next_cursor,
        })
    }

    /// Streaming replay for result sets too large to hold in memory
    pub async fn replay_stream(
        &self,
        checkpoint_id: &str,
    ) -> Result<BoxStream<'_, Result<PersistedLogEvent>>> {
        let checkpoint = self.checkpoints.get(checkpoint_id).await?;
        Ok(self
            .repository
            .stream_events_after(checkpoint.last_sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryLogStore;
    use crate::domain::SequencedLogEvent;
    use crate::error::LogHookError;
    use chrono::Utc;
    use futures::TryStreamExt;

    fn event(sequence_id: i64) -> SequencedLogEvent {
        SequencedLogEvent {
            level: "INFO".to_string(),
            message: format!("event {}", sequence_id),
            source: "s".to_string(),
            metadata: serde_json::Map::new(),
            timestamp: Utc::now(),
            sequence_id,
        }
    }

    fn services() -> (Arc<MemoryLogStore>, Arc<CheckpointManager>, ReplayService) {
        let store = Arc::new(MemoryLogStore::new());
        let checkpoints = Arc::new(CheckpointManager::new(store.clone()));
        let replay = ReplayService::new(checkpoints.clone(), store.clone());
        (store, checkpoints, replay)
    }

    fn ids(events: &[PersistedLogEvent]) -> Vec<i64> {
        events.iter().map(|e| e.sequence_id).collect()
    }

    #[tokio::test]
    async fn test_replay_returns_events_after_checkpoint() {
        let (store, checkpoints, replay) = services();
        store
            .insert_batch(&(1..=5).map(event).collect::<Vec<_>>())
            .await
            .unwrap();
        let checkpoint = checkpoints.create().await.unwrap();
        assert_eq!(checkpoint.last_sequence, 5);

        store.insert_batch(&[event(7), event(6)]).await.unwrap();

        let events = replay.replay(&checkpoint.checkpoint_id).await.unwrap();
        assert_eq!(ids(&events), vec![6, 7]);

        let again = replay.replay(&checkpoint.checkpoint_id).await.unwrap();
        assert_eq!(events, again);
    }

    #[tokio::test]
    async fn test_replay_unknown_checkpoint() {
        let (_, _, replay) = services();

        let err = replay.replay("does-not-exist").await.unwrap_err();
        assert!(matches!(err, LogHookError::CheckpointNotFound(_)));
    }

    #[tokio::test]
    async fn test_replay_pages_with_cursor() {
        let (store, checkpoints, replay) = services();
        let checkpoint = checkpoints.create().await.unwrap();
        store
            .insert_batch(&(1..=5).map(event).collect::<Vec<_>>())
            .await
            .unwrap();

        let first = replay
            .replay_page(&checkpoint.checkpoint_id, None, 2)
            .await
            .unwrap();
        assert_eq!(ids(&first.events), vec![1, 2]);
        assert_eq!(first.next_cursor, Some(2));

        let second = replay
            .replay_page(&checkpoint.checkpoint_id, first.next_cursor, 2)
            .await
            .unwrap();
        assert_eq!(ids(&second.events), vec![3, 4]);

        let last = replay
            .replay_page(&checkpoint.checkpoint_id, second.next_cursor, 2)
            .await
            .unwrap();
        assert_eq!(ids(&last.events), vec![5]);
        assert_eq!(last.next_cursor, None);
    }

    #[tokio::test]
    async fn test_cursor_cannot_reach_before_checkpoint() {
        let (store, checkpoints, replay) = services();
        store.insert_batch(&[event(1), event(2)]).await.unwrap();
        let checkpoint = checkpoints.create().await.unwrap();
        store.insert_batch(&[event(3)]).await.unwrap();

        let page = replay
            .replay_page(&checkpoint.checkpoint_id, Some(0), 10)
            .await
            .unwrap();
        assert_eq!(ids(&page.events), vec![3]);
    }

    #[tokio::test]
    async fn test_stream_matches_materialized_replay() {
        let (store, checkpoints, replay) = services();
        store.insert_batch(&[event(1)]).await.unwrap();
        let checkpoint = checkpoints.create().await.unwrap();
        store.insert_batch(&[event(2), event(3)]).await.unwrap();

        let streamed: Vec<_> = replay
            .replay_stream(&checkpoint.checkpoint_id)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids(&streamed), vec![2, 3]);
    }
}
