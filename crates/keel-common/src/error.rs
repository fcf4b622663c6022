//! Error types for Keel
//!
//! Errors are structured with fields to aid debugging in production.
//! Validation errors render only their message so the reconciler can copy
//! it verbatim onto the App status.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Keel operations
#[derive(Debug, Error)]
pub enum Error {
    /// User intent or cluster policy cannot be reconciled
    #[error("{message}")]
    Validation {
        /// Name of the App with invalid configuration
        app: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.ingress.cnames")
        field: Option<String>,
    },

    /// Chart values could not be encoded
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    ///
    /// For simple validation errors without App context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            app: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with App context
    pub fn validation_for(app: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            app: app.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with App context and field path
    pub fn validation_for_field(
        app: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            app: app.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors recur until the input changes,
    /// so the reconciler should wait for a spec change instead of requeuing.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Validation { .. } | Error::Serialization { .. } => false,
        }
    }

    /// Get the App name if this error is associated with a specific App
    pub fn app(&self) -> Option<&str> {
        match self {
            Error::Validation { app, .. } => Some(app),
            Error::Serialization { .. } => None,
        }
    }

    /// Get the offending field path, if known
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Machine-readable reason for status conditions
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "ValidationFailed",
            Error::Serialization { .. } => "SerializationFailed",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
