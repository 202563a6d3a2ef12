use axum::{extract::State, http::StatusCode, Json};

use crate::api::{state::AppState, types::*};
use crate::services::{check_health, HealthResponse, HealthStatus};

/// GET /health -- liveness/readiness probe
pub async fn health_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let health = check_health(&state.pipeline, state.start_time).await;

    if health.status == HealthStatus::Healthy {
        Ok(Json(health))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health)))
    }
}

/// GET /api/system/status
///
/// Storage figures are `null` when their backend does not answer.
pub async fn get_system_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let pipeline = &state.pipeline;
    let worker = pipeline.worker.stats().await;

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        queue_depth: pipeline.queue.len().await.ok(),
        last_sequence_issued: pipeline.sequencer.current().await.ok(),
        high_water_mark: pipeline.repository.high_water_mark().await.ok(),
        counters: pipeline.metrics.snapshot(),
        worker: WorkerStatus {
            drains: worker.drains,
            batches_committed: worker.batches_committed,
            commit_failures: worker.commit_failures,
            last_drain: worker.last_drain,
            last_error: worker.last_error,
        },
    })
}
