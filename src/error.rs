//! Structured error handling for the contest trading core.
//!
//! `AppError` groups the distinct error kinds from the error-handling
//! design: validation, authn/authz, state, risk, upstream, conflict
//! (retryable), timeout (retryable), and fatal. User-initiated operations
//! return the most specific kind with a human-readable reason; scanners log
//! and continue past per-item failures instead of propagating them.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    pub request_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub enum AppError {
    // Validation
    Validation(String),
    // AuthN / AuthZ
    Unauthorized(String),
    Forbidden(String),
    // State
    MarketClosed,
    ContestNotActive,
    ContestFull,
    AlreadyJoined,
    PositionNotOpen,
    OrderNotPending,
    InsufficientCapital { required: rust_decimal::Decimal, available: rust_decimal::Decimal },
    InsufficientBalance { required: rust_decimal::Decimal, available: rust_decimal::Decimal },
    NotFound(String),
    // Risk
    RiskRejected(String),
    // Upstream
    PriceUnavailable(String),
    PriceStale(String),
    PriceFallback(String),
    // Conflict (retryable)
    Conflict(String),
    // Timeout (retryable)
    Timeout(String),
    // Fatal
    Fatal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        use AppError::*;
        match self {
            Validation(_) => StatusCode::BAD_REQUEST,
            Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Forbidden(_) => StatusCode::FORBIDDEN,
            MarketClosed | ContestNotActive | ContestFull | AlreadyJoined
            | PositionNotOpen | OrderNotPending | InsufficientCapital { .. }
            | InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            NotFound(_) => StatusCode::NOT_FOUND,
            RiskRejected(_) => StatusCode::BAD_REQUEST,
            PriceUnavailable(_) | PriceStale(_) | PriceFallback(_) => StatusCode::BAD_GATEWAY,
            Conflict(_) => StatusCode::CONFLICT,
            Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        use AppError::*;
        match self {
            Validation(_) => "VALIDATION_ERROR",
            Unauthorized(_) => "UNAUTHORIZED",
            Forbidden(_) => "FORBIDDEN",
            MarketClosed => "MARKET_CLOSED",
            ContestNotActive => "CONTEST_NOT_ACTIVE",
            ContestFull => "CONTEST_FULL",
            AlreadyJoined => "ALREADY_JOINED",
            PositionNotOpen => "POSITION_NOT_OPEN",
            OrderNotPending => "ORDER_NOT_PENDING",
            InsufficientCapital { .. } => "INSUFFICIENT_CAPITAL",
            InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            NotFound(_) => "NOT_FOUND",
            RiskRejected(_) => "RISK_REJECTED",
            PriceUnavailable(_) => "PRICE_UNAVAILABLE",
            PriceStale(_) => "PRICE_STALE",
            PriceFallback(_) => "PRICE_FALLBACK",
            Conflict(_) => "TRANSACTION_CONFLICT",
            Timeout(_) => "TIMEOUT",
            Fatal(_) => "FATAL",
        }
    }

    /// Retryable errors are retried by the scheduler on the next tick,
    /// never in a tight loop inside the request path.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_) | AppError::Timeout(_))
    }

    fn message(&self) -> String {
        use AppError::*;
        match self {
            Validation(m) => m.clone(),
            Unauthorized(m) => m.clone(),
            Forbidden(m) => m.clone(),
            MarketClosed => "Market is closed".to_string(),
            ContestNotActive => "Contest is not active".to_string(),
            ContestFull => "Contest has reached its participant limit".to_string(),
            AlreadyJoined => "Already a participant in this contest".to_string(),
            PositionNotOpen => "Position not found or already closed".to_string(),
            OrderNotPending => "Order is not pending".to_string(),
            InsufficientCapital { required, available } => {
                format!("Insufficient capital: required {}, available {}", required, available)
            }
            InsufficientBalance { required, available } => {
                format!("Insufficient balance: required {}, available {}", required, available)
            }
            NotFound(m) => m.clone(),
            RiskRejected(m) => m.clone(),
            PriceUnavailable(m) => format!("Price unavailable: {}", m),
            PriceStale(m) => format!("Price stale: {}", m),
            PriceFallback(m) => format!("Price flagged as fallback: {}", m),
            Conflict(m) => m.clone(),
            Timeout(m) => m.clone(),
            Fatal(m) => m.clone(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.message(),
                details: None,
            },
            request_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        tracing::error!(
            request_id = %body.request_id,
            error_code = %body.error.code,
            retryable = self.is_retryable(),
            status = %status,
            "contest core error"
        );

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Fatal(err.to_string())
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(err: tokio_postgres::Error) -> Self {
        AppError::Conflict(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        AppError::Timeout(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_are_flagged() {
        assert!(AppError::Conflict("x".into()).is_retryable());
        assert!(AppError::Timeout("x".into()).is_retryable());
        assert!(!AppError::Validation("x".into()).is_retryable());
    }

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(AppError::Unauthorized("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::PositionNotOpen.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Timeout("x".into()).status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}
