//! Wiring of the ingestion core over one storage backend

use crate::adapters::memory::{MemoryLogStore, MemoryQueue, MemorySequencer};
use crate::adapters::PostgresStore;
use crate::config::AppConfig;
use crate::persistence::{
    CheckpointManager, DurableQueue, LogRepository, PersistenceWorker, PersistenceWorkerConfig,
    ReplayService, Sequencer,
};
use crate::services::{IngestMetrics, IngestService};
use std::sync::Arc;

/// Every service of the ingestion core, sharing one sequencer, queue and store
#[derive(Clone)]
pub struct Pipeline {
    pub sequencer: Arc<dyn Sequencer>,
    pub queue: Arc<dyn DurableQueue>,
    pub repository: Arc<dyn LogRepository>,
    pub metrics: Arc<IngestMetrics>,
    pub worker: Arc<PersistenceWorker>,
    pub ingest: Arc<IngestService>,
    pub checkpoints: Arc<CheckpointManager>,
    pub replay: Arc<ReplayService>,
}

impl Pipeline {
    pub fn new(
        sequencer: Arc<dyn Sequencer>,
        queue: Arc<dyn DurableQueue>,
        repository: Arc<dyn LogRepository>,
        config: &AppConfig,
    ) -> Self {
        let metrics = Arc::new(IngestMetrics::new());
        let worker = Arc::new(PersistenceWorker::new(
            PersistenceWorkerConfig::from_config(&config.queue, &config.worker),
            queue.clone(),
            repository.clone(),
            metrics.clone(),
        ));
        let ingest = Arc::new(
            IngestService::new(
                sequencer.clone(),
                queue.clone(),
                worker.clone(),
                metrics.clone(),
            )
            .with_persist_inline(config.ingest.persist_inline),
        );
        let checkpoints = Arc::new(CheckpointManager::new(repository.clone()));
        let replay = Arc::new(ReplayService::new(checkpoints.clone(), repository.clone()));

        Self {
            sequencer,
            queue,
            repository,
            metrics,
            worker,
            ingest,
            checkpoints,
            replay,
        }
    }

    /// Volatile in-process pipeline
    pub fn in_memory(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(MemorySequencer::new()),
            Arc::new(MemoryQueue::new()),
            Arc::new(MemoryLogStore::new()),
            config,
        )
    }

    /// Pipeline whose three seams all live in one PostgreSQL database
    pub fn postgres(store: PostgresStore, config: &AppConfig) -> Self {
        let store = Arc::new(store);
        Self::new(store.clone(), store.clone(), store, config)
    }
}
