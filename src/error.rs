//! Error types for the FitRec engine
//!
//! This module provides the error hierarchy shared by the scoring core and the
//! HTTP layer:
//! - `thiserror` for ergonomic error definitions
//! - Domain-specific variants so callers can tell rejection from failure
//! - HTTP status code mapping for API responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;

/// Result type alias for FitRec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the FitRec engine
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig {
        key: &'static str,
        message: Cow<'static, str>,
    },

    // ========================================================================
    // Recommendation Engine Errors
    // ========================================================================
    #[error("Recommendation model is not loaded yet")]
    NotLoaded,

    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: Cow<'static, str>,
    },

    #[error("Catalog error: {message}")]
    Catalog {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ========================================================================
    // Feedback Store Errors
    // ========================================================================
    #[error("Feedback store error: {message}")]
    Store {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Internal server error")]
    Internal {
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ========================================================================
    // Plumbing
    // ========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    // ========================================================================
    // Constructors for common error patterns
    // ========================================================================

    /// Create a validation error for a single request field
    pub fn validation(field: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Create a catalog error
    pub fn catalog(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Catalog {
            message: message.into(),
            source: None,
        }
    }

    /// Create a catalog error with source
    pub fn catalog_with_source(
        message: impl Into<Cow<'static, str>>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Catalog {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a feedback store error with source
    pub fn store_with_source(
        message: impl Into<Cow<'static, str>>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error
    pub fn internal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal {
            source: Some(Box::new(source)),
        }
    }

    // ========================================================================
    // Error Classification
    // ========================================================================

    /// Returns true if the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NotLoaded | Error::Store { .. })
    }

    /// Returns true if this error should be logged at error level
    pub fn is_error_level(&self) -> bool {
        matches!(
            self,
            Error::Catalog { .. } | Error::Store { .. } | Error::Internal { .. } | Error::Io(_)
        )
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidConfig { .. } => "CONFIG_ERROR",
            Error::NotLoaded => "MODEL_NOT_LOADED",
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::Catalog { .. } => "CATALOG_ERROR",
            Error::Store { .. } => "STORE_ERROR",
            Error::Json(_) => "SERIALIZATION_ERROR",
            Error::Io(_) | Error::Internal { .. } | Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}

// ============================================================================
// Error Response for API
// ============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if self.is_error_level() {
            tracing::error!(error = ?self, "request failed");
        }

        // Don't expose internal error details in production
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let field = match &self {
            Error::Validation { field, .. } => Some(*field),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message,
                field,
                retryable: self.is_retryable().then_some(true),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::internal(err)
    }
}
