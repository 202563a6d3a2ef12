use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;

use crate::api::{auth::ensure_ingest_authorized, state::AppState, types::*};
use crate::domain::RawLogEvent;
use crate::error::{LogHookError, ValidationErrors};

/// Largest array accepted by the batch endpoint
pub const MAX_BATCH_EVENTS: usize = 1000;

fn body_error(message: impl Into<String>) -> LogHookError {
    let mut errors = ValidationErrors::new();
    errors.push("body", message);
    LogHookError::Validation(errors)
}

/// POST /logs
pub async fn ingest_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Json<RawLogEvent>, JsonRejection>,
) -> ApiResult<IngestResponse> {
    ensure_ingest_authorized(&headers, &state.auth)?;
    let Json(raw) = body.map_err(|e| body_error(e.body_text()))?;

    let receipt = state.pipeline.ingest.ingest(raw).await?;

    Ok(Json(IngestResponse {
        status: receipt.status,
        sequence_id: receipt.sequence_id,
    }))
}

/// POST /logs/batch
///
/// Items are judged one by one; the response is 200 even when some of
/// them were rejected.
pub async fn ingest_log_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Json<Vec<Value>>, JsonRejection>,
) -> ApiResult<BatchIngestResponse> {
    ensure_ingest_authorized(&headers, &state.auth)?;
    let Json(items) = body.map_err(|e| body_error(e.body_text()))?;

    if items.len() > MAX_BATCH_EVENTS {
        return Err(body_error(format!(
            "at most {} events per batch",
            MAX_BATCH_EVENTS
        ))
        .into());
    }

    // Non-object items are rejected without reaching the service
    let mut is_event = Vec::with_capacity(items.len());
    let mut raws = Vec::new();
    for item in items {
        let raw = if item.is_object() {
            serde_json::from_value::<RawLogEvent>(item).ok()
        } else {
            None
        };
        is_event.push(raw.is_some());
        raws.extend(raw);
    }

    let mut outcomes = state.pipeline.ingest.ingest_batch(raws).await.into_iter();
    let mut results = Vec::with_capacity(is_event.len());
    for event in is_event {
        let outcome = if event {
            outcomes
                .next()
                .unwrap_or_else(|| Err(LogHookError::Internal("missing batch result".into())))
        } else {
            Err(body_error("must be a JSON object"))
        };

        results.push(match outcome {
            Ok(receipt) => BatchItemResult::Accepted {
                status: receipt.status,
                sequence_id: receipt.sequence_id,
            },
            Err(LogHookError::Validation(errors)) => BatchItemResult::Rejected {
                error: "validation failed".to_string(),
                fields: errors.into_inner(),
            },
            // Backing store failures fail the item, not the request
            Err(e) => {
                let api = ApiError::from(e);
                BatchItemResult::Rejected {
                    error: api.body.error,
                    fields: Vec::new(),
                }
            }
        });
    }

    let accepted = results
        .iter()
        .filter(|r| matches!(r, BatchItemResult::Accepted { .. }))
        .count();

    Ok(Json(BatchIngestResponse {
        accepted,
        rejected: results.len() - accepted,
        results,
    }))
}
