use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Event as sent by a producer, not yet trusted.
///
/// Fields are kept as raw JSON so the validator can report wrong types
/// per field instead of failing the whole body at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLogEvent {
    pub level: Option<Value>,
    pub message: Option<Value>,
    pub source: Option<Value>,
    /// `None` only when the key is absent; an explicit `null` is kept
    #[serde(
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<Value>,
    /// Producer-supplied instant; assigned at processing time when absent
    pub timestamp: Option<Value>,
}

impl RawLogEvent {
    pub fn new(level: &str, message: &str, source: &str) -> Self {
        Self {
            level: Some(Value::String(level.to_string())),
            message: Some(Value::String(message.to_string())),
            source: Some(Value::String(source.to_string())),
            metadata: None,
            timestamp: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(Value::String(timestamp.to_rfc3339()));
        self
    }
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Validated, canonical event that has not been sequenced yet
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedLogEvent {
    pub level: String,
    pub message: String,
    pub source: String,
    pub metadata: Map<String, Value>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl NormalizedLogEvent {
    /// Attach a sequence number, stamping `now` if the producer gave no timestamp
    pub fn into_sequenced(self, sequence_id: i64, now: DateTime<Utc>) -> SequencedLogEvent {
        SequencedLogEvent {
            level: self.level,
            message: self.message,
            source: self.source,
            metadata: self.metadata,
            timestamp: self.timestamp.unwrap_or(now),
            sequence_id,
        }
    }
}

/// Event carrying its globally unique, increasing sequence number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedLogEvent {
    pub level: String,
    pub message: String,
    pub source: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub sequence_id: i64,
}

/// A sequenced event as stored in the `logs` table (immutable, keyed by `sequence_id`)
pub type PersistedLogEvent = SequencedLogEvent;

/// A durable queue entry awaiting persistence
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    /// Queue-local identifier used to acknowledge the entry
    pub entry_id: i64,
    pub event: SequencedLogEvent,
}
