use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::info;

use crate::api::{state::AppState, types::*};
use crate::persistence::replay::MAX_PAGE_SIZE;

/// POST /checkpoint
pub async fn create_checkpoint(State(state): State<AppState>) -> ApiResult<CheckpointResponse> {
    let checkpoint = state.pipeline.checkpoints.create().await?;
    info!(
        "Checkpoint {} created at sequence {}",
        checkpoint.checkpoint_id, checkpoint.last_sequence
    );
    Ok(Json(checkpoint.into()))
}

/// GET /checkpoints
pub async fn list_checkpoints(
    State(state): State<AppState>,
    Query(query): Query<CheckpointListQuery>,
) -> ApiResult<CheckpointListResponse> {
    let checkpoints = state.pipeline.checkpoints.list(query.limit).await?;
    Ok(Json(CheckpointListResponse {
        checkpoints: checkpoints.into_iter().map(Into::into).collect(),
    }))
}

/// GET /replay/:checkpoint_id
///
/// Without `after` or `limit` the whole tail is returned in one response.
pub async fn replay_checkpoint(
    State(state): State<AppState>,
    Path(checkpoint_id): Path<String>,
    Query(query): Query<ReplayQuery>,
) -> ApiResult<ReplayResponse> {
    let replay = &state.pipeline.replay;

    if query.after.is_none() && query.limit.is_none() {
        let checkpoint = state.pipeline.checkpoints.get(&checkpoint_id).await?;
        let logs = replay.replay(&checkpoint_id).await?;
        return Ok(Json(ReplayResponse {
            checkpoint_id: checkpoint.checkpoint_id,
            last_sequence: checkpoint.last_sequence,
            logs,
            next_cursor: None,
        }));
    }

    let page = replay
        .replay_page(
            &checkpoint_id,
            query.after,
            query.limit.unwrap_or(MAX_PAGE_SIZE),
        )
        .await?;

    Ok(Json(ReplayResponse {
        checkpoint_id: page.checkpoint.checkpoint_id,
        last_sequence: page.checkpoint.last_sequence,
        logs: page.events,
        next_cursor: page.next_cursor,
    }))
}
