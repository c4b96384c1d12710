use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Minimum order size a redemption must reach
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderContent {
    #[schema(value_type = f64, example = 50)]
    pub min_amount: Decimal,
    #[validate(range(min = 0, message = "Minimum item count cannot be negative"))]
    #[serde(alias = "number_of_items")]
    #[schema(example = 2)]
    pub min_items: i32,
}

/// Binds a coupon to a single username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ProfileInfo {
    #[validate(length(min = 1, message = "Profile username cannot be empty"))]
    #[schema(example = "john_doe")]
    pub username: String,
    /// Marks the bound user as a frequent customer. Stored and returned,
    /// not used by any rule.
    #[serde(default)]
    pub frequent: bool,
}

impl ProfileInfo {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            frequent: false,
        }
    }
}

/// Requires a number of prior non-coupon orders placed since a cutoff date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderHistory {
    #[validate(range(min = 0, message = "Minimum order count cannot be negative"))]
    #[serde(alias = "min_orders_with_coupon")]
    #[schema(example = 3)]
    pub min_orders: i32,
    #[serde(alias = "check_till_date")]
    pub since: DateTime<Utc>,
    /// Whose orders are counted. Falls back to the profile username, then to
    /// the redeeming user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// A stored coupon
///
/// `usage` is the remaining number of redemptions. It only ever moves down,
/// one step at a time, through the store's conditional decrement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Coupon {
    pub id: Uuid,
    #[schema(example = "K7QX-M2RD-9HWT")]
    pub coupon_code: String,
    #[schema(value_type = f64, example = 10)]
    pub discount_percent: Decimal,
    #[schema(example = 5)]
    pub usage: i32,
    pub expiry_date: DateTime<Utc>,
    pub order_content: Option<OrderContent>,
    #[serde(alias = "profile_info")]
    pub profile: Option<ProfileInfo>,
    pub order_history: Option<OrderHistory>,
    pub created_at: DateTime<Utc>,
}

/// Flat row shape of the `coupons` table
#[derive(Debug, Clone, FromRow)]
pub struct CouponRow {
    pub id: Uuid,
    pub coupon_code: String,
    pub discount_percent: Decimal,
    pub remaining_usage: i32,
    pub expiry_date: DateTime<Utc>,
    pub min_order_amount: Option<Decimal>,
    pub min_order_items: Option<i32>,
    pub profile_username: Option<String>,
    pub profile_frequent: bool,
    pub history_min_orders: Option<i32>,
    pub history_since: Option<DateTime<Utc>>,
    pub history_username: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CouponRow> for Coupon {
    fn from(row: CouponRow) -> Self {
        let order_content = match (row.min_order_amount, row.min_order_items) {
            (Some(min_amount), Some(min_items)) => Some(OrderContent { min_amount, min_items }),
            _ => None,
        };
        let order_history = match (row.history_min_orders, row.history_since) {
            (Some(min_orders), Some(since)) => Some(OrderHistory {
                min_orders,
                since,
                username: row.history_username,
            }),
            _ => None,
        };

        Self {
            id: row.id,
            coupon_code: row.coupon_code,
            discount_percent: row.discount_percent,
            usage: row.remaining_usage,
            expiry_date: row.expiry_date,
            order_content,
            profile: row.profile_username.map(|username| ProfileInfo {
                username,
                frequent: row.profile_frequent,
            }),
            order_history,
            created_at: row.created_at,
        }
    }
}

/// Request DTO for creating a coupon
///
/// The three core fields are optional on the wire so that their absence is
/// reported by the creation rules rather than by JSON decoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCouponRequest {
    #[schema(value_type = Option<f64>, example = 10)]
    pub discount_percent: Option<Decimal>,
    #[schema(example = 5)]
    pub usage: Option<i32>,
    pub expiry_date: Option<DateTime<Utc>>,
    #[validate]
    pub order_content: Option<OrderContent>,
    #[validate]
    #[serde(alias = "profile_info")]
    pub profile: Option<ProfileInfo>,
    #[validate]
    pub order_history: Option<OrderHistory>,
}

/// Request DTO for redeeming a coupon against an order
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RedeemCouponRequest {
    #[validate(length(min = 1, message = "Coupon code is required"))]
    #[schema(example = "FLAT10")]
    pub coupon_code: String,
    #[schema(value_type = f64, example = 100)]
    pub order_amount: Decimal,
    #[validate(range(min = 0, message = "Item count cannot be negative"))]
    #[schema(example = 3)]
    pub num_items: i32,
    #[validate(length(min = 1, message = "Username is required"))]
    #[schema(example = "john_doe")]
    pub username: String,
}

/// Response DTO for a successful redemption
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RedeemResponse {
    pub redeem_status: bool,
    pub coupon_code: String,
    pub remaining_usage: i32,
}
