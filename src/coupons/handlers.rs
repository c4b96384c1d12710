// HTTP handlers for coupon endpoints

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::coupons::metrics::MetricsSummary;
use crate::coupons::models::{Coupon, CreateCouponRequest, RedeemCouponRequest, RedeemResponse};
use crate::error::ApiError;
use crate::AppState;

/// Handler for POST /api/coupons
/// Creates a new coupon with a generated code
#[utoipa::path(
    post,
    path = "/api/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = Coupon),
        (status = 400, description = "Rejected by a creation rule", body = ErrorResponse,
            example = json!({"error_code": "USERNAME_DOES_NOT_EXIST", "message": "username does not exist", "timestamp": "2024-01-01T00:00:00+00:00"})),
        (status = 503, description = "A lookup collaborator is unavailable", body = ErrorResponse)
    ),
    tag = "coupons"
)]
pub async fn create_coupon_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    tracing::debug!("Creating coupon");

    payload.validate()?;

    let coupon = state.coupon_service.create_coupon(payload).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// Handler for GET /api/coupons
/// Lists all coupons, newest first
#[utoipa::path(
    get,
    path = "/api/coupons",
    responses(
        (status = 200, description = "All coupons", body = Vec<Coupon>),
        (status = 503, description = "Coupon store unavailable", body = ErrorResponse)
    ),
    tag = "coupons"
)]
pub async fn list_coupons_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Coupon>>, ApiError> {
    let coupons = state.coupon_service.list_coupons().await?;
    Ok(Json(coupons))
}

/// Handler for POST /api/redeem
/// Applies a coupon to an order, consuming one use
#[utoipa::path(
    post,
    path = "/api/redeem",
    request_body = RedeemCouponRequest,
    responses(
        (status = 200, description = "Coupon redeemed", body = RedeemResponse),
        (status = 400, description = "Rejected by a redemption rule", body = ErrorResponse,
            example = json!({"error_code": "USAGE_EXHAUSTED", "message": "coupon usage exhausted", "timestamp": "2024-01-01T00:00:00+00:00"})),
        (status = 404, description = "Coupon not found", body = ErrorResponse),
        (status = 409, description = "Lost the usage race on every attempt", body = ErrorResponse),
        (status = 503, description = "A lookup collaborator is unavailable", body = ErrorResponse)
    ),
    tag = "coupons"
)]
pub async fn redeem_coupon_handler(
    State(state): State<AppState>,
    Json(payload): Json<RedeemCouponRequest>,
) -> Result<Json<RedeemResponse>, ApiError> {
    tracing::debug!(
        "Redeeming coupon {} for '{}'",
        payload.coupon_code,
        payload.username
    );

    payload.validate()?;

    let response = state.coupon_service.redeem_coupon(payload).await?;
    Ok(Json(response))
}

/// Handler for GET /api/coupons/metrics
/// Decision counters since start-up
#[utoipa::path(
    get,
    path = "/api/coupons/metrics",
    responses(
        (status = 200, description = "Decision counters", body = MetricsSummary)
    ),
    tag = "coupons"
)]
pub async fn coupon_metrics_handler(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.coupon_service.metrics().summary())
}
