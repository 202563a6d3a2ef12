//! Checkpoint Manager
//!
//! A checkpoint records the persisted high-water mark: the highest
//! `sequence_id` whose row is committed in the relational store at creation
//! time. It is never derived from the sequencer's live counter, which can run
//! ahead of what has landed, so every event at or below the recorded mark is
//! already durable.

use crate::domain::{new_checkpoint_id, Checkpoint};
use crate::error::{LogHookError, Result};
use crate::persistence::LogRepository;
use std::sync::Arc;
use tracing::{debug, info};

/// Default page size when listing checkpoints
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Creates and looks up immutable checkpoints
pub struct CheckpointManager {
    repository: Arc<dyn LogRepository>,
}

impl CheckpointManager {
    pub fn new(repository: Arc<dyn LogRepository>) -> Self {
        Self { repository }
    }

    /// Snapshot the committed high-water mark under a fresh id
    pub async fn create(&self) -> Result<Checkpoint> {
        let checkpoint_id = new_checkpoint_id();
        let checkpoint = self.repository.create_checkpoint(&checkpoint_id).await?;

        info!(
            "Created checkpoint {} at sequence {}",
            checkpoint.checkpoint_id, checkpoint.last_sequence
        );

        Ok(checkpoint)
    }

    /// Look up a checkpoint, failing with `CheckpointNotFound` when absent
    pub async fn get(&self, checkpoint_id: &str) -> Result<Checkpoint> {
        match self.repository.get_checkpoint(checkpoint_id).await? {
            Some(checkpoint) => Ok(checkpoint),
            None => {
                debug!("No checkpoint found for {}", checkpoint_id);
                Err(LogHookError::CheckpointNotFound(checkpoint_id.to_string()))
            }
        }
    }

    pub async fn list(&self, limit: Option<i64>) -> Result<Vec<Checkpoint>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 1000);
        self.repository.list_checkpoints(limit).await
    }
}
