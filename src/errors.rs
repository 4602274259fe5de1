use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Standardized error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict").
    pub error: String,
    /// Human-readable error description.
    pub message: String,
    /// Itemized details, when the failure aggregates several issues.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    /// ISO 8601 timestamp when the error occurred.
    pub timestamp: String,
}

/// Error taxonomy of the checkout/order core.
///
/// Preview-time per-line issues are collected into the checkout snapshot and
/// never surface here; these variants are for commit-time and lookup
/// failures, which abort the enclosing operation as a whole.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Commit-time stock race: the atomic decrement found less stock than
    /// the preview promised.
    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    /// Voucher expired, exhausted, inactive, or minimum order not met.
    #[error("Voucher invalid: {0}")]
    VoucherInvalid(String),

    /// Flash-sale per-user purchase cap exceeded.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Illegal order-status change.
    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    /// Authoritative pricing pass refused the order; carries the snapshot's
    /// itemized validation errors.
    #[error("Checkout is not ready for payment")]
    CheckoutInvalid(Vec<String>),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Event error: {0}")]
    EventError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) | Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::InsufficientStock(_)
            | Self::VoucherInvalid(_)
            | Self::QuotaExceeded(_)
            | Self::CheckoutInvalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::EventError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// text to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::EventError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match &self {
            ServiceError::CheckoutInvalid(errors) => Some(errors.clone()),
            _ => None,
        };

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
