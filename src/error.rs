use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Main error type for the ingestion service
#[derive(Error, Debug)]
pub enum LogHookError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Producer input errors (never retried, no sequence number consumed)
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Authentication error: {0}")]
    Auth(String),

    // Sequencer / queue backing store unreachable (safe to retry)
    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    // Persistence commit failure, retried by the worker
    #[error("Transient storage error: {0}")]
    TransientStorage(String),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LogHookError {
    /// Whether the failed operation may succeed if attempted again unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::TransientStorage(_) | Self::Database(_) | Self::Io(_)
        )
    }
}

/// Result type alias for LogHookError
pub type Result<T> = std::result::Result<T, LogHookError>;

/// A single rejected field on an incoming event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// All field-level problems found on one event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Names of the offending fields, in the order they were checked
    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.field.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<FieldError> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl From<ValidationErrors> for LogHookError {
    fn from(errors: ValidationErrors) -> Self {
        LogHookError::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_display() {
        let mut errors = ValidationErrors::new();
        errors.push("level", "is required");
        errors.push("source", "must be a string");

        assert_eq!(errors.fields(), vec!["level", "source"]);
        assert_eq!(
            LogHookError::from(errors).to_string(),
            "Validation failed: level: is required; source: must be a string"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LogHookError::Unavailable("down".into()).is_retryable());
        assert!(LogHookError::TransientStorage("commit".into()).is_retryable());
        assert!(!LogHookError::CheckpointNotFound("x".into()).is_retryable());
        assert!(!LogHookError::Validation(ValidationErrors::new()).is_retryable());
    }
}
