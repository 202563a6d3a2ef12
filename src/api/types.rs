use crate::domain::{Checkpoint, PersistedLogEvent};
use crate::error::{FieldError, LogHookError};
use crate::services::{IngestStatus, MetricsSnapshot};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

/// Handler error carrying the HTTP status it maps to
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: message.into(),
                fields: Vec::new(),
            },
        }
    }
}

pub fn status_for(err: &LogHookError) -> StatusCode {
    match err {
        LogHookError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LogHookError::Auth(_) => StatusCode::FORBIDDEN,
        LogHookError::CheckpointNotFound(_) => StatusCode::NOT_FOUND,
        LogHookError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<LogHookError> for ApiError {
    fn from(err: LogHookError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!("Request failed: {}", err);
        }

        match err {
            LogHookError::Validation(errors) => Self {
                status,
                body: ErrorBody {
                    error: "validation failed".to_string(),
                    fields: errors.into_inner(),
                },
            },
            LogHookError::CheckpointNotFound(id) => {
                Self::new(status, format!("checkpoint {} not found", id))
            }
            LogHookError::Auth(message) | LogHookError::Unavailable(message) => {
                Self::new(status, message)
            }
            _ => Self::new(status, "internal error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// ============================================================================
// Ingestion Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: IngestStatus,
    pub sequence_id: i64,
}

/// Outcome of one element of a batch request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum BatchItemResult {
    Accepted {
        status: IngestStatus,
        sequence_id: i64,
    },
    Rejected {
        error: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fields: Vec<FieldError>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchIngestResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub results: Vec<BatchItemResult>,
}

// ============================================================================
// Checkpoint & Replay Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointResponse {
    pub checkpoint_id: String,
    pub last_sequence: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Checkpoint> for CheckpointResponse {
    fn from(c: Checkpoint) -> Self {
        Self {
            checkpoint_id: c.checkpoint_id,
            last_sequence: c.last_sequence,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckpointListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointListResponse {
    pub checkpoints: Vec<CheckpointResponse>,
}

#[derive(Debug, Deserialize)]
pub struct ReplayQuery {
    /// Last sequence id already seen
    pub after: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayResponse {
    pub checkpoint_id: String,
    pub last_sequence: i64,
    pub logs: Vec<PersistedLogEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<i64>,
}

// ============================================================================
// System Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub queue_depth: Option<u64>,
    pub last_sequence_issued: Option<i64>,
    pub high_water_mark: Option<i64>,
    pub counters: MetricsSnapshot,
    pub worker: WorkerStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub drains: u64,
    pub batches_committed: u64,
    pub commit_failures: u64,
    pub last_drain: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationErrors;

    #[test]
    fn test_error_status_mapping() {
        let mut errors = ValidationErrors::new();
        errors.push("level", "is required");

        let api: ApiError = LogHookError::Validation(errors).into();
        assert_eq!(api.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(api.body.fields[0].field, "level");

        let api: ApiError = LogHookError::CheckpointNotFound("x".into()).into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);

        let api: ApiError = LogHookError::Auth("nope".into()).into();
        assert_eq!(api.status, StatusCode::FORBIDDEN);

        let api: ApiError = LogHookError::Unavailable("down".into()).into();
        assert_eq!(api.status, StatusCode::SERVICE_UNAVAILABLE);

        let api: ApiError = LogHookError::Internal("secret detail".into()).into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.body.error, "internal error");
    }

    #[test]
    fn test_batch_item_serialization() {
        let accepted = serde_json::to_value(BatchItemResult::Accepted {
            status: IngestStatus::Enqueued,
            sequence_id: 4,
        })
        .unwrap();
        assert_eq!(accepted["result"], "accepted");
        assert_eq!(accepted["status"], "enqueued");
        assert_eq!(accepted["sequence_id"], 4);
    }
}
