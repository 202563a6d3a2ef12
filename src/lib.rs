pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod services;
pub mod validation;

pub use config::AppConfig;
pub use coordination::{GracefulShutdown, ShutdownSignal};
pub use domain::{Checkpoint, PersistedLogEvent, RawLogEvent, SequencedLogEvent};
pub use error::{LogHookError, Result};
pub use persistence::{
    CheckpointManager, DrainReport, DurableQueue, LogRepository, PersistenceWorker,
    PersistenceWorkerConfig, ReplayService, Sequencer,
};
pub use services::{IngestReceipt, IngestService, IngestStatus, Pipeline};
pub use validation::validate_event;
