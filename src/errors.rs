use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

/// Standard error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Unprocessable Entity",
    "code": "insufficient_balance",
    "message": "Insufficient balance: required 1000, current 500",
    "details": {"required": 1000, "current": 500},
    "timestamp": "2025-11-02T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Bad Request")
    pub error: String,
    /// Stable machine-readable code clients can branch on
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// Structured context for codes that carry it (e.g. required/current balance)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Listing unavailable: {0}")]
    ListingUnavailable(String),

    #[error("Out of stock: {0}")]
    OutOfStock(String),

    #[error("Cannot purchase your own listing")]
    SelfPurchase,

    #[error("Payment method not accepted: {0}")]
    PaymentMethodNotAccepted(String),

    #[error("A shipping address is required for physical items")]
    ShippingAddressRequired,

    #[error("Insufficient balance: required {required}, current {current}")]
    InsufficientBalance { required: i64, current: i64 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment processor error: {0}")]
    ProcessorError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Stable machine code exposed to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StorageError(_) => "storage_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::ListingUnavailable(_) => "listing_unavailable",
            Self::OutOfStock(_) => "out_of_stock",
            Self::SelfPurchase => "self_purchase",
            Self::PaymentMethodNotAccepted(_) => "payment_method_not_accepted",
            Self::ShippingAddressRequired => "shipping_address_required",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::Unauthorized(_) => "unauthorized",
            Self::BadRequest(_) => "bad_request",
            Self::Conflict(_) => "conflict",
            Self::ProcessorError(_) => "processor_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::StorageError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidOperation(_)
            | Self::SelfPurchase
            | Self::PaymentMethodNotAccepted(_)
            | Self::ShippingAddressRequired
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ListingUnavailable(_) | Self::OutOfStock(_) | Self::InsufficientBalance { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ProcessorError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message suitable for HTTP responses. Internal failures are reduced to a
    /// generic message; user-actionable causes keep their detail.
    pub fn response_message(&self) -> String {
        match self {
            Self::StorageError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            Self::ProcessorError(_) => {
                "Payment processor unavailable, please try again".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Structured context attached to the response body for codes that carry it.
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientBalance { required, current } => {
                Some(json!({ "required": required, "current": current }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            details: self.details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
