//! Error types for collection operations
//!
//! Errors are classified by recoverability:
//! - Retryable: transient store failures (locked database, disk hiccups)
//! - NonRetryable: invalid state transitions, rendering failures
//! - RequiresUserAction: bad input, dead invitation links, missing sign-in

use thiserror::Error;

use crate::db::DbError;

/// Error type for everything above the store layer.
#[derive(Debug, Error)]
pub enum SareError {
    // Requires user action
    #[error("This invitation link is not valid.")]
    TokenInvalid,

    #[error("This invitation link has expired. Ask for a new one.")]
    TokenExpired,

    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{0}")]
    Duplicate(String),

    #[error("You must be signed in to do this.")]
    NotAuthenticated,

    // Non-retryable
    #[error("{0}")]
    NotFound(String),

    #[error("A story has already been submitted for this invitation.")]
    AlreadySubmitted(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("The report is locked and can no longer be regenerated.")]
    ReportLocked,

    #[error("The report is not ready yet: {0}")]
    ReportNotReady(String),

    #[error("Failed to render report: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Retryable
    #[error("Store error: {0}")]
    Store(DbError),
}

impl SareError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, SareError::Store(_))
    }

    /// Returns true if this error requires user action to resolve
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            SareError::TokenInvalid
                | SareError::TokenExpired
                | SareError::Validation { .. }
                | SareError::Duplicate(_)
                | SareError::NotAuthenticated
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SareError::TokenInvalid => {
                "Check the link you were sent, or ask the person who invited you for a new one."
            }
            SareError::TokenExpired => "Ask the person who invited you to send a fresh link.",
            SareError::Validation { .. } => "Correct the highlighted field and try again.",
            SareError::Duplicate(_) => "Use a different email address for this storyteller.",
            SareError::NotAuthenticated => "Sign in and try again.",
            SareError::NotFound(_) => "Refresh and try again. The record may have been removed.",
            SareError::AlreadySubmitted(_) => {
                "This story was already received. Nothing more to do."
            }
            SareError::InvalidTransition { .. } => "Refresh to see the current status.",
            SareError::ReportLocked => "The report was finalized. Download the existing copy.",
            SareError::ReportNotReady(_) => "Finish collecting and reflecting first.",
            SareError::Render(_) => "Try generating the report again.",
            SareError::Config(_) => "Check your configuration in ~/.sare/config.json",
            SareError::Store(_) => "Wait a moment and try again.",
        }
    }
}

impl From<DbError> for SareError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::DuplicateStorytellerEmail => SareError::Duplicate(err.to_string()),
            DbError::StorytellerNotFound(_) | DbError::ProfileNotFound(_) => {
                SareError::NotFound(err.to_string())
            }
            DbError::StoryAlreadySubmitted(id) => SareError::AlreadySubmitted(id),
            DbError::InvalidTransition { from, to } => SareError::InvalidTransition { from, to },
            DbError::InvalidField { field, message } => SareError::Validation { field, message },
            other => SareError::Store(other),
        }
    }
}

/// Serializable error representation for API and UI layers
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Retryable,
    NonRetryable,
    RequiresUserAction,
}

impl From<&SareError> for ApiError {
    fn from(err: &SareError) -> Self {
        let error_type = if err.requires_user_action() {
            ErrorType::RequiresUserAction
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::NonRetryable
        };

        ApiError {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_email_message_preserved() {
        let err: SareError = DbError::DuplicateStorytellerEmail.into();
        assert_eq!(
            err.to_string(),
            "A storyteller with this email address already exists in your list."
        );
        assert!(err.requires_user_action());
    }

    #[test]
    fn test_api_error_classification() {
        let api = ApiError::from(&SareError::TokenExpired);
        assert!(!api.can_retry);
        assert!(matches!(api.error_type, ErrorType::RequiresUserAction));

        let api = ApiError::from(&SareError::Store(DbError::Migration("x".into())));
        assert!(api.can_retry);
    }
}
