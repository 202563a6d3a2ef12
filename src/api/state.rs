use crate::config::AuthConfig;
use crate::services::Pipeline;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Ingestion core
    pub pipeline: Pipeline,

    /// Credential gate for ingestion
    pub auth: Arc<AuthConfig>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, auth: AuthConfig) -> Self {
        Self {
            pipeline,
            auth: Arc::new(auth),
            start_time: Utc::now(),
        }
    }

    /// Get system uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
