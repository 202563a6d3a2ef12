use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Ingestion endpoints
        .route("/logs", post(handlers::ingest_log))
        .route("/logs/batch", post(handlers::ingest_log_batch))
        // Checkpoint & replay endpoints
        .route("/checkpoint", post(handlers::create_checkpoint))
        .route("/checkpoints", get(handlers::list_checkpoints))
        .route("/replay/:checkpoint_id", get(handlers::replay_checkpoint))
        // System endpoints
        .route("/health", get(handlers::health_handler))
        .route("/api/system/status", get(handlers::get_system_status))
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}
