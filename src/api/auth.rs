use crate::config::AuthConfig;
use crate::error::LogHookError;
use axum::http::{header::AUTHORIZATION, HeaderMap};

pub const API_KEY_HEADER: &str = "x-api-key";

fn extract_bearer_token(raw: &str) -> Option<&str> {
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .map(str::trim)
}

fn provided_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(extract_bearer_token)
        })
}

/// Check the producer credential on an ingestion request
///
/// Accepts the key in `x-api-key` or as a bearer token. A missing key
/// with `required = false` leaves the gate open; with `required = true`
/// every request fails as unavailable until a key is configured.
pub fn ensure_ingest_authorized(
    headers: &HeaderMap,
    auth: &AuthConfig,
) -> std::result::Result<(), LogHookError> {
    let expected = auth
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());

    let Some(expected) = expected else {
        if auth.required {
            return Err(LogHookError::Unavailable(
                "ingest auth is required but auth.api_key is not configured".to_string(),
            ));
        }
        return Ok(());
    };

    if provided_key(headers).is_some_and(|k| k == expected) {
        Ok(())
    } else {
        Err(LogHookError::Auth("invalid or missing API key".to_string()))
    }
}
