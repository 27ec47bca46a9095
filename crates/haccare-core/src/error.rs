//! Error types for the hacCare simulation engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// The live simulation can no longer be synced in place; the caller
    /// must launch a fresh simulation instead.
    #[error("Relaunch required: {reason}")]
    RelaunchRequired { reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::NotFound { .. } => ErrorCode::NotFound,
            CoreError::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            CoreError::Validation { .. } => ErrorCode::Validation,
            CoreError::InvalidState { .. } => ErrorCode::InvalidState,
            CoreError::RelaunchRequired { .. } => ErrorCode::RelaunchRequired,
            CoreError::Database(_) => ErrorCode::Database,
            CoreError::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// Error codes returned to callers of the lifecycle entrypoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    Validation,
    InvalidState,
    RelaunchRequired,
    Database,
    Internal,
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relaunch_required_has_distinct_code() {
        let err = CoreError::RelaunchRequired {
            reason: "patient set changed".into(),
        };
        assert_eq!(err.code(), ErrorCode::RelaunchRequired);
        assert_eq!(
            serde_json::to_value(err.code()).unwrap(),
            serde_json::json!("RELAUNCH_REQUIRED")
        );
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = CoreError::not_found("template", "abc");
        assert_eq!(err.to_string(), "Entity not found: template with id abc");
    }
}
