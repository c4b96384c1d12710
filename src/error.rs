// Error handling module for the Coupon API
// Provides centralized error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

use crate::coupons::error::CouponError;
use crate::coupons::rules::RejectionReason;

/// Main error type for the API
/// All handlers should return Result<T, ApiError>
///
/// Each variant maps to a specific HTTP status code and error response format.
#[derive(Debug)]
pub enum ApiError {
    /// Request body failed structural validation
    /// Maps to HTTP 400 Bad Request
    ValidationError(validator::ValidationErrors),

    /// Request was well-formed but unusable
    /// Maps to HTTP 400 Bad Request
    InvalidRequest(String),

    /// A coupon rule said no
    /// Maps to HTTP 404 for an unknown coupon, HTTP 400 otherwise
    Rejected(RejectionReason),

    /// Lost the usage-counter race too many times
    /// Maps to HTTP 409 Conflict
    Conflict { message: String },

    /// A store or lookup collaborator failed or timed out
    /// Maps to HTTP 503 Service Unavailable
    ServiceUnavailable(String),

    /// Internal server errors
    /// Maps to HTTP 500 Internal Server Error
    /// Sensitive details are filtered from client responses
    InternalError(String),
}

/// Consistent error response structure
///
/// Carries both a machine-readable `error_code` and the human-readable message.
/// For rejections the message is the rule's reason, verbatim.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "VALIDATION_ERROR", "COUPON_EXPIRED")
    pub error_code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (e.g., field-level validation errors)
    /// Omitted from JSON when None
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,

    /// RFC 3339 timestamp of when the error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    fn new(error_code: &str, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.to_string(),
            message: message.into(),
            details: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = self.to_error_response();
        (status, Json(error_response)).into_response()
    }
}

impl ApiError {
    /// Convert ApiError to HTTP status code and ErrorResponse
    ///
    /// Logging level follows severity: debug! for expected client errors,
    /// warn! for conflicts and unavailable dependencies, error! for internal
    /// failures.
    fn to_error_response(&self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::ValidationError(errors) => {
                debug!("Validation error: {:?}", errors);

                let mut response = ErrorResponse::new("VALIDATION_ERROR", "Request validation failed");
                response.details =
                    Some(serde_json::to_value(errors).unwrap_or(serde_json::json!({})));
                (StatusCode::BAD_REQUEST, response)
            }
            ApiError::InvalidRequest(message) => {
                debug!("Invalid request: {}", message);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new("VALIDATION_ERROR", message.clone()),
                )
            }
            ApiError::Rejected(reason) => {
                debug!("Coupon rejected: {}", reason);
                (
                    self.status_code(),
                    ErrorResponse::new(reason.code(), reason.message()),
                )
            }
            ApiError::Conflict { message } => {
                warn!("Conflict error: {}", message);
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::new("CONFLICT", message.clone()),
                )
            }
            ApiError::ServiceUnavailable(detail) => {
                // Full detail stays in the logs; it may name internal systems
                warn!("Dependency unavailable: {}", detail);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::new(
                        "SERVICE_UNAVAILABLE",
                        "A required service is temporarily unavailable, please retry",
                    ),
                )
            }
            ApiError::InternalError(internal_msg) => {
                error!("Internal error: {}", internal_msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("INTERNAL_ERROR", "An internal server error occurred"),
                )
            }
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Rejected(RejectionReason::CouponNotFound) => StatusCode::NOT_FOUND,
            ApiError::Rejected(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert coupon errors to ApiError
impl From<CouponError> for ApiError {
    fn from(error: CouponError) -> Self {
        match error {
            CouponError::Rejected(reason) => ApiError::Rejected(reason),
            CouponError::Transient(detail) => ApiError::ServiceUnavailable(detail),
            e @ CouponError::Conflict { .. } => ApiError::Conflict {
                message: e.to_string(),
            },
            e @ CouponError::Corrupted { .. } => ApiError::InternalError(e.to_string()),
            CouponError::ValidationError(message) => ApiError::InvalidRequest(message),
        }
    }
}

/// Convert validator errors to ApiError
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors)
    }
}
