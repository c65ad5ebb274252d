//! Error types for Boost Guard
//!
//! Every failure the engine can surface carries a stable machine code, an
//! HTTP status and a retryable flag so the query layer can report it typed.

use hyper::StatusCode;
use serde::Serialize;

/// Main error type for Boost Guard operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum BoostError {
    /// Unknown boost (or other addressed record)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Boost names a strategy that is not registered
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    /// Boost params do not satisfy the strategy schema
    #[error("Invalid strategy params: {0}")]
    InvalidStrategyParams(String),

    /// No signing key is currently available for the guard
    #[error("Signing unavailable: {0}")]
    SigningUnavailable(String),

    /// A concurrent writer changed the claim ledger underneath us
    #[error("Ledger conflict: {0}")]
    LedgerConflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Registry or token resolver failure
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON body returned for failed requests
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl BoostError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::UnknownStrategy(_) => "UNKNOWN_STRATEGY",
            Self::InvalidStrategyParams(_) => "INVALID_STRATEGY_PARAMS",
            Self::SigningUnavailable(_) => "SIGNING_UNAVAILABLE",
            Self::LedgerConflict(_) => "LEDGER_CONFLICT",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may retry the same request after backing off
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SigningUnavailable(_) | Self::LedgerConflict(_) | Self::Upstream(_) | Self::Database(_)
        )
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UnknownStrategy(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidStrategyParams(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::SigningUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::LedgerConflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to status code and JSON body for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, ErrorBody) {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.code(),
            retryable: self.is_retryable(),
            message: self.to_string(),
        };
        (status, body)
    }
}

impl From<std::io::Error> for BoostError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for BoostError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for BoostError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<reqwest::Error> for BoostError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<mongodb::error::Error> for BoostError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type alias for Boost Guard operations
pub type Result<T> = std::result::Result<T, BoostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_retryability() {
        let err = BoostError::SigningUnavailable("no key".into());
        assert_eq!(err.code(), "SIGNING_UNAVAILABLE");
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err = BoostError::InvalidStrategyParams("missing recipients".into());
        assert_eq!(err.code(), "INVALID_STRATEGY_PARAMS");
        assert!(!err.is_retryable());

        let err = BoostError::UnknownStrategy("quadratic".into());
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_error_body() {
        let (status, body) = BoostError::LedgerConflict("pool moved".into()).into_status_code_and_body();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.error, "LEDGER_CONFLICT");
        assert!(body.retryable);
        assert_eq!(body.message, "Ledger conflict: pool moved");
    }
}
