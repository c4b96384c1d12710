// Rule contexts
//
// Immutable fact snapshots that the rules are evaluated against. A context is
// assembled fresh for every decision; collaborator lookups happen here and
// never inside a rule.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use crate::coupons::error::CouponResult;
use crate::coupons::models::{Coupon, CreateCouponRequest, OrderContent, RedeemCouponRequest};
use crate::coupons::repository::{with_timeout, OrderLedger, UserDirectory};

/// Facts needed by the creation rules
#[derive(Debug, Clone, PartialEq)]
pub struct CreationContext {
    pub discount_percent: Option<Decimal>,
    pub usage: Option<i32>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub profile_username: Option<String>,
    /// Only resolved when a profile constraint is declared
    pub profile_exists: Option<bool>,
    pub now: DateTime<Utc>,
}

/// Facts needed by the redemption rules
#[derive(Debug, Clone, PartialEq)]
pub struct RedemptionContext {
    pub expiry_date: DateTime<Utc>,
    pub usage: i32,
    pub order_content: Option<OrderContent>,
    pub profile_username: Option<String>,
    pub order_history_min: Option<i32>,
    /// Only resolved when an order-history constraint is declared
    pub qualifying_orders: Option<i64>,
    pub order_amount: Decimal,
    pub num_items: i32,
    pub username: String,
    pub now: DateTime<Utc>,
}

/// Builds rule contexts, resolving external facts through the collaborators
#[derive(Clone)]
pub struct RuleContextBuilder {
    users: Arc<dyn UserDirectory>,
    orders: Arc<dyn OrderLedger>,
    lookup_timeout: Duration,
}

impl RuleContextBuilder {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        orders: Arc<dyn OrderLedger>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            users,
            orders,
            lookup_timeout,
        }
    }

    /// Context for a creation candidate
    ///
    /// An unknown profile username is recorded as `profile_exists = false`
    /// and left for the rules to reject. A failed lookup is a transient error.
    pub async fn for_creation(
        &self,
        candidate: &CreateCouponRequest,
        now: DateTime<Utc>,
    ) -> CouponResult<CreationContext> {
        let profile_username = candidate.profile.as_ref().map(|p| p.username.clone());

        let profile_exists = match &profile_username {
            Some(username) => {
                let exists = with_timeout(
                    self.lookup_timeout,
                    "user_exists",
                    self.users.user_exists(username),
                )
                .await?;
                tracing::debug!("Profile user '{}' exists: {}", username, exists);
                Some(exists)
            }
            None => None,
        };

        Ok(CreationContext {
            discount_percent: candidate.discount_percent,
            usage: candidate.usage,
            expiry_date: candidate.expiry_date,
            profile_username,
            profile_exists,
            now,
        })
    }

    /// Context for redeeming `coupon` against `request`
    pub async fn for_redemption(
        &self,
        coupon: &Coupon,
        request: &RedeemCouponRequest,
        now: DateTime<Utc>,
    ) -> CouponResult<RedemptionContext> {
        let profile_username = coupon.profile.as_ref().map(|p| p.username.clone());

        let qualifying_orders = match &coupon.order_history {
            Some(history) => {
                let username = history
                    .username
                    .as_deref()
                    .or(profile_username.as_deref())
                    .unwrap_or(&request.username);
                let count = with_timeout(
                    self.lookup_timeout,
                    "count_qualifying_orders",
                    self.orders.count_qualifying_orders(username, history.since),
                )
                .await?;
                tracing::debug!(
                    "User '{}' has {} qualifying orders since {}",
                    username,
                    count,
                    history.since
                );
                Some(count)
            }
            None => None,
        };

        Ok(RedemptionContext {
            expiry_date: coupon.expiry_date,
            usage: coupon.usage,
            order_content: coupon.order_content.clone(),
            profile_username,
            order_history_min: coupon.order_history.as_ref().map(|h| h.min_orders),
            qualifying_orders,
            order_amount: request.order_amount,
            num_items: request.num_items,
            username: request.username.clone(),
            now,
        })
    }
}
