//! Sequencing, queueing and persistence core
//!
//! - Sequencer issuing durable, strictly increasing sequence numbers
//! - Durable queue with reserve-then-acknowledge consumption
//! - Persistence worker draining the queue into the relational store
//! - Checkpoint manager and replay service over committed rows

pub mod checkpoint;
pub mod queue;
pub mod replay;
pub mod repository;
pub mod sequencer;
pub mod worker;

pub use checkpoint::CheckpointManager;
pub use queue::{DrainLease, DurableQueue};
pub use replay::{ReplayPage, ReplayService};
pub use repository::LogRepository;
pub use sequencer::{Sequencer, SEQUENCE_KEY};
pub use worker::{BatchOutcome, DrainReport, PersistenceWorker, PersistenceWorkerConfig, WorkerStats};
