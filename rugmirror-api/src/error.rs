//! HTTP Error Responses
//!
//! Every failing endpoint answers with an [`ApiError`] body:
//! `{"code": "TOKEN_NOT_FOUND", "message": "...", "details": {...}}`.
//! Request-level [`MirrorError`]s are mapped here; tolerated failures never
//! reach this layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rugmirror_core::{ChainError, ConfigError, MirrorError, StorageError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

// ============================================================================
// ERROR CODES
// ============================================================================

/// Machine-readable error category, serialized in SCREAMING_SNAKE_CASE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 400
    /// Malformed or out-of-range query parameter
    InvalidInput,
    /// No contract is configured for the requested chain
    UnsupportedChain,

    // 404
    TokenNotFound,

    // 5xx
    InternalError,
    /// The chain could not supply data the request depends on
    UpstreamUnavailable,
    ServiceUnavailable,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput | ErrorCode::UnsupportedChain => StatusCode::BAD_REQUEST,
            ErrorCode::TokenNotFound => StatusCode::NOT_FOUND,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message used when nothing more specific can be said safely.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid request parameters",
            ErrorCode::UnsupportedChain => "Chain is not supported",
            ErrorCode::TokenNotFound => "Token not found",
            ErrorCode::InternalError => "Something went wrong on our side",
            ErrorCode::UpstreamUnavailable => "Blockchain data unavailable",
            ErrorCode::ServiceUnavailable => "Try again shortly",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// Structured context, e.g. the offending field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn unsupported_chain(chain_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::UnsupportedChain,
            format!("No contract configured for chain {}", chain_id),
        )
    }

    pub fn token_not_found(token_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::TokenNotFound,
            format!("Token {} does not exist", token_id),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnavailable, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

// ============================================================================
// MIRROR ERROR MAPPING
// ============================================================================

impl From<MirrorError> for ApiError {
    fn from(err: MirrorError) -> Self {
        match err {
            MirrorError::Config(ConfigError::UnknownChain { chain_id }) => {
                ApiError::unsupported_chain(chain_id)
                    .with_details(json!({ "chainId": chain_id }))
            }
            MirrorError::Config(ConfigError::InvalidValue {
                field,
                value,
                reason,
            }) => ApiError::invalid_input(format!("{} {}", field, reason))
                .with_details(json!({ "field": field, "value": value })),
            MirrorError::Config(ConfigError::MissingRequired { field }) => {
                tracing::error!(field = %field, "missing required configuration");
                ApiError::from_code(ErrorCode::InternalError)
            }
            MirrorError::Config(error @ ConfigError::FetchFailed { .. }) => {
                ApiError::upstream_unavailable(error.to_string())
            }
            MirrorError::Chain(error) => {
                match &error {
                    ChainError::AllFetchesFailed { .. } | ChainError::SupplyUnavailable { .. } => {}
                    other => tracing::error!(error = %other, "chain read failed"),
                }
                ApiError::upstream_unavailable(error.to_string())
            }
            MirrorError::Storage(error) => {
                // Keys and backend paths stay out of responses.
                tracing::error!(error = %error, "storage failure");
                match error {
                    StorageError::LockPoisoned => ApiError::from_code(ErrorCode::ServiceUnavailable),
                    _ => ApiError::from_code(ErrorCode::InternalError),
                }
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
