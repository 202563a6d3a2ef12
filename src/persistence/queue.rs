//! Durable FIFO buffer between ingestion and persistence
//!
//! Consumption is reserve-then-acknowledge: `peek_batch` never removes
//! anything, and entries disappear only through `ack` once their rows are
//! committed. A consumer crashing between the two leaves the entries in place.
//!
//! Only the holder of the queue's drain lease may reserve and acknowledge.
//! The lease is shared by every process consuming the same queue name.

use crate::domain::{QueuedEvent, SequencedLogEvent};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Exclusive right to consume a queue, released when dropped
pub struct DrainLease {
    _held: Box<dyn Send>,
}

impl DrainLease {
    pub fn new(held: impl Send + 'static) -> Self {
        Self {
            _held: Box::new(held),
        }
    }
}

impl fmt::Debug for DrainLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DrainLease")
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Durably append an event, returning its queue entry id
    async fn push(&self, event: &SequencedLogEvent) -> Result<i64>;

    /// Up to `limit` oldest entries, left in place
    async fn peek_batch(&self, limit: usize) -> Result<Vec<QueuedEvent>>;

    /// Permanently remove the given entries; returns how many were removed
    async fn ack(&self, entry_ids: &[i64]) -> Result<u64>;

    /// Entries still pending
    async fn len(&self) -> Result<u64>;

    /// Wait until no other consumer, in this process or another, holds the lease
    async fn acquire_drain_lease(&self) -> Result<DrainLease>;

    /// Take the lease only if it is free right now
    async fn try_acquire_drain_lease(&self) -> Result<Option<DrainLease>>;
}
