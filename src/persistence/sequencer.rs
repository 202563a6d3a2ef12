//! Sequence number issuance
//!
//! A sequencer hands out globally unique, strictly increasing `i64` values
//! backed by durable shared state. Values are never reused; a number handed
//! to an event that is later dropped leaves a permanent gap.

use crate::error::Result;
use async_trait::async_trait;

/// Name of the durable counter shared by every ingestion process
pub const SEQUENCE_KEY: &str = "log_sequence";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sequencer: Send + Sync {
    /// Issue the next sequence number (the first call after provisioning returns 1)
    ///
    /// Fails with `Unavailable` when the backing store cannot be reached;
    /// a failed call consumes no number.
    async fn next(&self) -> Result<i64>;

    /// Last value issued, 0 if none
    async fn current(&self) -> Result<i64>;
}
