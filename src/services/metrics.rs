use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local counters for the ingestion pipeline
#[derive(Debug, Default)]
pub struct IngestMetrics {
    /// Events sequenced and queued
    accepted: AtomicU64,
    /// Events rejected by validation
    rejected: AtomicU64,
    /// Ingest calls failed because the sequencer or queue was unreachable
    unavailable: AtomicU64,
    /// Rows newly written by the persistence worker
    persisted: AtomicU64,
    /// Batch commits that failed and were left queued
    commit_failures: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub unavailable: u64,
    pub persisted: u64,
    pub commit_failures: u64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unavailable(&self) {
        self.unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_persisted(&self, rows: u64) {
        self.persisted.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn inc_commit_failures(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
        }
    }

    /// One-line summary for periodic logging
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "accepted={} rejected={} unavailable={} persisted={} commit_failures={}",
            s.accepted, s.rejected, s.unavailable, s.persisted, s.commit_failures
        )
    }
}
