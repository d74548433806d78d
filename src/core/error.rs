//! # Reminder Errors
//!
//! Error taxonomy for every reminder operation. Each variant is fatal to the
//! single operation that produced it; nothing here is retried automatically.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Split backend failures into `BackendFailure` with a timeout variant
//! - 1.0.0: Initial taxonomy

use std::time::Duration;

/// Result alias used across the reminder layer
pub type ReminderResult<T> = std::result::Result<T, ReminderError>;

/// Every failure a reminder operation can surface to its caller
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReminderError {
    /// Access to the reminder domain resolved to denied (or timed out)
    #[error("Access to reminders was not granted: {reason}")]
    PermissionDenied { reason: String },

    /// The backend has no collection to create the reminder in
    #[error("No default reminder list found")]
    NoDefaultCollection,

    /// A write appeared to succeed but its post-conditions did not hold
    #[error("Reminder write could not be verified: {reason}")]
    WriteVerificationFailed { reason: String },

    /// The native layer failed, including operational timeouts
    #[error("Backend error: {0}")]
    Backend(#[from] BackendFailure),

    /// A filter named a field outside `completed`, `flagged`, `priority`
    #[error("Unknown filter key '{key}' (expected one of: completed, flagged, priority)")]
    InvalidFilterKey { key: String },

    /// Caller-supplied input was rejected before any native call
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

/// Native-layer failure detail carried by `ReminderError::Backend`
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendFailure {
    #[error("{operation} timed out after {}s", after.as_secs_f64())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("script exited with {code:?}: {message}")]
    ScriptFailed { code: Option<i32>, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("native call failed: {0}")]
    Native(String),

    #[error("no backend available: {0}")]
    Unavailable(String),
}

impl ReminderError {
    /// Stable machine-readable kind, used in logs and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            ReminderError::PermissionDenied { .. } => "permission_denied",
            ReminderError::NoDefaultCollection => "no_default_collection",
            ReminderError::WriteVerificationFailed { .. } => "write_verification_failed",
            ReminderError::Backend(BackendFailure::Timeout { .. }) => "backend_timeout",
            ReminderError::Backend(_) => "backend_error",
            ReminderError::InvalidFilterKey { .. } => "invalid_filter_key",
            ReminderError::InvalidArgument { .. } => "invalid_argument",
        }
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        ReminderError::PermissionDenied {
            reason: reason.into(),
        }
    }

    pub fn verification(reason: impl Into<String>) -> Self {
        ReminderError::WriteVerificationFailed {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        ReminderError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        ReminderError::Backend(BackendFailure::Timeout { operation, after })
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        ReminderError::Backend(BackendFailure::MalformedResponse(detail.into()))
    }

    pub fn native(detail: impl Into<String>) -> Self {
        ReminderError::Backend(BackendFailure::Native(detail.into()))
    }
}
