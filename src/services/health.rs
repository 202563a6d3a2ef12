//! Liveness and readiness of the storage backends

use crate::services::Pipeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Health status for a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Component health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    fn from_probe<T, E: std::fmt::Display>(name: &str, probe: Result<T, E>) -> Self {
        match probe {
            Ok(_) => Self {
                name: name.to_string(),
                status: HealthStatus::Healthy,
                message: None,
            },
            Err(e) => Self {
                name: name.to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(e.to_string()),
            },
        }
    }
}

/// Overall system health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub components: Vec<ComponentHealth>,
}

async fn probe<T>(
    fut: impl std::future::Future<Output = crate::error::Result<T>>,
) -> Result<T, String> {
    match tokio::time::timeout(PROBE_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("no answer within {:?}", PROBE_TIMEOUT)),
    }
}

/// Probe the sequencer, the queue and the relational store
///
/// Ingestion needs the first two, so either failing makes the service
/// unhealthy; a failing store only delays persistence and counts as degraded.
pub async fn check_health(pipeline: &Pipeline, started_at: DateTime<Utc>) -> HealthResponse {
    let sequencer =
        ComponentHealth::from_probe("sequencer", probe(pipeline.sequencer.current()).await);
    let queue = ComponentHealth::from_probe("queue", probe(pipeline.queue.len()).await);
    let store = ComponentHealth::from_probe("store", probe(pipeline.repository.ping()).await);

    let status = if !sequencer.status.is_healthy() || !queue.status.is_healthy() {
        HealthStatus::Unhealthy
    } else if !store.status.is_healthy() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    HealthResponse {
        status,
        timestamp: Utc::now(),
        uptime_seconds: (Utc::now() - started_at).num_seconds().max(0) as u64,
        components: vec![sequencer, queue, store],
    }
}
