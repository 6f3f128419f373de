use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Error codes for programmatic handling by the view layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Configuration errors
    ConfigMissing,
    ConfigInvalid,

    // Authentication errors
    AuthCancelled,
    AuthRejected,
    AuthStateMismatch,
    AuthNetwork,
    AuthInvalidResponse,
    AuthInProgress,
    AuthInvalidTransition,
    AuthInterrupted,
    AuthNotInitialized,
    InteractionRequired,
    Unauthenticated,

    // Record API errors
    InvalidToken,
    NotInitialized,
    TokenExpired,
    ApiRequestFailed,
    ApiTransport,
    ApiDecode,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = serde_json::to_value(self).map_err(|_| fmt::Error)?;
        f.write_str(value.as_str().unwrap_or("unknown"))
    }
}

/// Error categories for status mapping and retry hints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing or malformed settings - fatal to the requesting operation
    Configuration,
    /// Identity provider rejection, user cancellation, auth network failure
    Authentication,
    /// Operation attempted in the wrong order or while another is in flight
    Sequencing,
    /// Downstream record API failure
    Upstream,
}

impl ErrorCategory {
    /// Returns true if the user should be offered a retry
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Authentication | Self::Upstream => true,
            Self::Configuration | Self::Sequencing => false,
        }
    }

    /// HTTP status used when the error reaches the view layer
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Sequencing => StatusCode::CONFLICT,
            Self::Upstream => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Configuration provider errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Required configuration key '{key}' is missing")]
    Missing { key: String },

    #[error("Invalid configuration value for '{key}': {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing { key: key.into() }
    }

    pub fn invalid(key: impl Into<String>, value: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Invalid {
            key: key.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// Interactive authentication and session sequencing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication was cancelled or abandoned by the user")]
    Cancelled,

    #[error("Identity provider rejected the request ({error}): {description}")]
    Rejected { error: String, description: String },

    #[error("Authorization response does not match any pending request")]
    StateMismatch,

    #[error("Network failure talking to the identity provider: {reason}")]
    Network { reason: String },

    #[error("Unexpected response from the identity provider: {reason}")]
    InvalidResponse { reason: String },

    #[error("A {operation} is already in progress")]
    InProgress { operation: &'static str },

    #[error("Cannot {operation} while the session is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: String,
    },

    #[error("Operation was interrupted by sign-out")]
    Interrupted,

    #[error("Identity client has not been initialized")]
    NotInitialized,
}

impl AuthError {
    pub fn network(reason: impl fmt::Display) -> Self {
        Self::Network {
            reason: reason.to_string(),
        }
    }

    pub fn invalid_response(reason: impl fmt::Display) -> Self {
        Self::InvalidResponse {
            reason: reason.to_string(),
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            Self::Cancelled => ErrorCode::AuthCancelled,
            Self::Rejected { .. } => ErrorCode::AuthRejected,
            Self::StateMismatch => ErrorCode::AuthStateMismatch,
            Self::Network { .. } => ErrorCode::AuthNetwork,
            Self::InvalidResponse { .. } => ErrorCode::AuthInvalidResponse,
            Self::InProgress { .. } => ErrorCode::AuthInProgress,
            Self::InvalidTransition { .. } => ErrorCode::AuthInvalidTransition,
            Self::Interrupted => ErrorCode::AuthInterrupted,
            Self::NotInitialized => ErrorCode::AuthNotInitialized,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InProgress { .. } | Self::InvalidTransition { .. } | Self::Interrupted => {
                ErrorCategory::Sequencing
            }
            Self::NotInitialized => ErrorCategory::Configuration,
            _ => ErrorCategory::Authentication,
        }
    }
}

/// Silent (cache / refresh token) acquisition errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SilentAuthError {
    #[error("User interaction required: {reason}")]
    InteractionRequired { reason: String },

    #[error("Network failure during silent token acquisition: {reason}")]
    Network { reason: String },

    #[error("Identity provider rejected the silent token request ({error}): {description}")]
    Rejected { error: String, description: String },
}

impl SilentAuthError {
    pub fn interaction_required(reason: impl fmt::Display) -> Self {
        Self::InteractionRequired {
            reason: reason.to_string(),
        }
    }
}

/// Record API client errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Access token is empty or a null sentinel")]
    InvalidToken,

    #[error("Record API client is not initialized: missing {missing}")]
    NotInitialized { missing: &'static str },

    #[error("Installed access token has expired")]
    TokenExpired,

    #[error("Record API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Record API transport failure: {reason}")]
    Transport { reason: String },

    #[error("Failed to decode record API response: {reason}")]
    Decode { reason: String },
}

impl RecordError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidToken => ErrorCode::InvalidToken,
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::TokenExpired => ErrorCode::TokenExpired,
            Self::Api { .. } => ErrorCode::ApiRequestFailed,
            Self::Transport { .. } => ErrorCode::ApiTransport,
            Self::Decode { .. } => ErrorCode::ApiDecode,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidToken | Self::NotInitialized { .. } | Self::TokenExpired => {
                ErrorCategory::Sequencing
            }
            Self::Api { .. } | Self::Transport { .. } | Self::Decode { .. } => ErrorCategory::Upstream,
        }
    }
}

/// Unified error surfaced to the view layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortalError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    SilentAuth(#[from] SilentAuthError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("Not authenticated")]
    Unauthenticated,
}

impl PortalError {
    /// Machine-readable error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config(ConfigError::Missing { .. }) => ErrorCode::ConfigMissing,
            Self::Config(ConfigError::Invalid { .. }) => ErrorCode::ConfigInvalid,
            Self::Auth(e) => e.code(),
            Self::SilentAuth(SilentAuthError::InteractionRequired { .. }) => ErrorCode::InteractionRequired,
            Self::SilentAuth(SilentAuthError::Network { .. }) => ErrorCode::AuthNetwork,
            Self::SilentAuth(SilentAuthError::Rejected { .. }) => ErrorCode::AuthRejected,
            Self::Record(e) => e.code(),
            Self::Unauthenticated => ErrorCode::Unauthenticated,
        }
    }

    /// Category driving status code and retry hint
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Auth(e) => e.category(),
            Self::SilentAuth(_) | Self::Unauthenticated => ErrorCategory::Authentication,
            Self::Record(e) => e.category(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let category = self.category();
        let status = category.status_code();

        match category {
            ErrorCategory::Configuration => error!(error = %self, "Portal internal error"),
            _ => warn!(error = %self, code = %self.code(), "Request failed"),
        }

        // Configuration details stay in the log
        let message = match category {
            ErrorCategory::Configuration => "Failed to get portal configuration".to_string(),
            _ => self.to_string(),
        };

        let body = json!({
            "error": self.code(),
            "message": message,
            "retryable": category.is_retryable(),
        });

        (status, Json(body)).into_response()
    }
}

/// Result type for portal operations
pub type PortalResult<T> = Result<T, PortalError>;
