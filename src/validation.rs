//! Input validation for producer-supplied log events
//!
//! Validation is a pure function: it never touches the sequencer or the queue,
//! so a rejected event consumes no sequence number.
use crate::domain::{NormalizedLogEvent, RawLogEvent};
use crate::error::ValidationErrors;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Check and canonicalize a raw event
///
/// # Returns
/// * `Ok(NormalizedLogEvent)` with `level` uppercased
/// * `Err(ValidationErrors)` naming every offending field
pub fn validate_event(raw: RawLogEvent) -> Result<NormalizedLogEvent, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let level = required_string(&mut errors, "level", raw.level);
    let message = required_string(&mut errors, "message", raw.message);
    let source = required_string(&mut errors, "source", raw.source);
    let metadata = metadata_map(&mut errors, raw.metadata);
    let timestamp = optional_timestamp(&mut errors, raw.timestamp);

    match (level, message, source) {
        (Some(level), Some(message), Some(source)) if errors.is_empty() => {
            Ok(NormalizedLogEvent {
                level: level.to_uppercase(),
                message,
                source,
                metadata,
                timestamp,
            })
        }
        _ => Err(errors),
    }
}

fn required_string(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<Value>,
) -> Option<String> {
    match value {
        None => {
            errors.push(field, "is required");
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.push(field, "must not be empty");
            None
        }
        Some(Value::String(s)) => Some(s),
        Some(_) => {
            errors.push(field, "must be a string");
            None
        }
    }
}

fn metadata_map(errors: &mut ValidationErrors, value: Option<Value>) -> Map<String, Value> {
    match value {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            errors.push("metadata", "must be an object with string keys");
            Map::new()
        }
    }
}

fn optional_timestamp(
    errors: &mut ValidationErrors,
    value: Option<Value>,
) -> Option<DateTime<Utc>> {
    match value {
        None => None,
        Some(Value::String(s)) => match DateTime::parse_from_rfc3339(&s) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(_) => {
                errors.push("timestamp", "must be an RFC 3339 timestamp");
                None
            }
        },
        Some(_) => {
            errors.push("timestamp", "must be an RFC 3339 timestamp");
            None
        }
    }
}
