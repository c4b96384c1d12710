// Coupon validation rules
//
// Two fixed, ordered rule sets. Evaluation stops at the first failing rule,
// so the order below decides which reason a caller sees.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coupons::context::{CreationContext, RedemptionContext};

/// Why a creation or redemption was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    MissingRequiredFields,
    UsernameDoesNotExist,
    CouponNotFound,
    CouponExpired,
    UsageExhausted,
    OrderContentBelowMinimum,
    UsernameMismatch,
    OrderHistoryInsufficient,
}

impl RejectionReason {
    /// User-facing explanation, returned verbatim to the caller
    pub fn message(self) -> &'static str {
        match self {
            RejectionReason::MissingRequiredFields => "missing required fields",
            RejectionReason::UsernameDoesNotExist => "username does not exist",
            RejectionReason::CouponNotFound => "coupon not found",
            RejectionReason::CouponExpired => "coupon has expired",
            RejectionReason::UsageExhausted => "coupon usage exhausted",
            RejectionReason::OrderContentBelowMinimum => {
                "order content does not meet minimum requirements"
            }
            RejectionReason::UsernameMismatch => "username does not match profile info",
            RejectionReason::OrderHistoryInsufficient => "usage limit reached for this coupon",
        }
    }

    /// Machine-readable code used in error envelopes
    pub fn code(self) -> &'static str {
        match self {
            RejectionReason::MissingRequiredFields => "MISSING_REQUIRED_FIELDS",
            RejectionReason::UsernameDoesNotExist => "USERNAME_DOES_NOT_EXIST",
            RejectionReason::CouponNotFound => "COUPON_NOT_FOUND",
            RejectionReason::CouponExpired => "COUPON_EXPIRED",
            RejectionReason::UsageExhausted => "USAGE_EXHAUSTED",
            RejectionReason::OrderContentBelowMinimum => "ORDER_CONTENT_BELOW_MINIMUM",
            RejectionReason::UsernameMismatch => "USERNAME_MISMATCH",
            RejectionReason::OrderHistoryInsufficient => "ORDER_HISTORY_INSUFFICIENT",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of evaluating a rule or a rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    pub reason: Option<RejectionReason>,
}

impl Verdict {
    pub fn pass() -> Self {
        Self { passed: true, reason: None }
    }

    pub fn reject(reason: RejectionReason) -> Self {
        Self { passed: false, reason: Some(reason) }
    }

    fn require(condition: bool, reason: RejectionReason) -> Self {
        if condition {
            Self::pass()
        } else {
            Self::reject(reason)
        }
    }

    /// The explanation for a failed verdict, empty when it passed
    pub fn message(&self) -> &'static str {
        self.reason.map(RejectionReason::message).unwrap_or("")
    }
}

/// Checks applied before a coupon is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationRule {
    RequiredFields,
    ProfileExists,
}

pub const CREATION_RULES: [CreationRule; 2] =
    [CreationRule::RequiredFields, CreationRule::ProfileExists];

impl CreationRule {
    pub fn name(self) -> &'static str {
        match self {
            CreationRule::RequiredFields => "required_fields",
            CreationRule::ProfileExists => "profile_exists",
        }
    }

    pub fn check(self, ctx: &CreationContext) -> Verdict {
        match self {
            CreationRule::RequiredFields => {
                let discount_ok = ctx.discount_percent.is_some_and(|d| d > Decimal::ZERO);
                let usage_ok = ctx.usage.is_some_and(|u| u > 0);
                Verdict::require(
                    discount_ok && usage_ok && ctx.expiry_date.is_some(),
                    RejectionReason::MissingRequiredFields,
                )
            }
            CreationRule::ProfileExists => match &ctx.profile_username {
                Some(_) => Verdict::require(
                    ctx.profile_exists == Some(true),
                    RejectionReason::UsernameDoesNotExist,
                ),
                None => Verdict::pass(),
            },
        }
    }
}

/// Checks applied to a stored coupon and an incoming redemption.
///
/// Existence of the coupon is checked first, by the engine, before a context
/// can be built at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionRule {
    NotExpired,
    UsageRemaining,
    OrderContent,
    ProfileMatch,
    OrderHistory,
}

pub const REDEMPTION_RULES: [RedemptionRule; 5] = [
    RedemptionRule::NotExpired,
    RedemptionRule::UsageRemaining,
    RedemptionRule::OrderContent,
    RedemptionRule::ProfileMatch,
    RedemptionRule::OrderHistory,
];

impl RedemptionRule {
    pub fn name(self) -> &'static str {
        match self {
            RedemptionRule::NotExpired => "not_expired",
            RedemptionRule::UsageRemaining => "usage_remaining",
            RedemptionRule::OrderContent => "order_content",
            RedemptionRule::ProfileMatch => "profile_match",
            RedemptionRule::OrderHistory => "order_history",
        }
    }

    pub fn check(self, ctx: &RedemptionContext) -> Verdict {
        match self {
            RedemptionRule::NotExpired => {
                Verdict::require(ctx.now < ctx.expiry_date, RejectionReason::CouponExpired)
            }
            RedemptionRule::UsageRemaining => {
                Verdict::require(ctx.usage > 0, RejectionReason::UsageExhausted)
            }
            RedemptionRule::OrderContent => match &ctx.order_content {
                Some(content) => Verdict::require(
                    ctx.order_amount >= content.min_amount && ctx.num_items >= content.min_items,
                    RejectionReason::OrderContentBelowMinimum,
                ),
                None => Verdict::pass(),
            },
            RedemptionRule::ProfileMatch => match &ctx.profile_username {
                Some(bound) => Verdict::require(
                    *bound == ctx.username,
                    RejectionReason::UsernameMismatch,
                ),
                None => Verdict::pass(),
            },
            RedemptionRule::OrderHistory => match ctx.order_history_min {
                Some(min_orders) => Verdict::require(
                    ctx.qualifying_orders.unwrap_or(0) >= i64::from(min_orders),
                    RejectionReason::OrderHistoryInsufficient,
                ),
                None => Verdict::pass(),
            },
        }
    }
}

/// Run the creation rules in order, stopping at the first failure
pub fn evaluate_creation(ctx: &CreationContext) -> Verdict {
    CREATION_RULES
        .iter()
        .map(|rule| rule.check(ctx))
        .find(|verdict| !verdict.passed)
        .unwrap_or_else(Verdict::pass)
}

/// Run the redemption rules in order, stopping at the first failure
pub fn evaluate_redemption(ctx: &RedemptionContext) -> Verdict {
    REDEMPTION_RULES
        .iter()
        .map(|rule| rule.check(ctx))
        .find(|verdict| !verdict.passed)
        .unwrap_or_else(Verdict::pass)
}

/// Ordered rule names, for start-up logging
pub fn describe() -> String {
    let creation: Vec<&str> = CREATION_RULES.iter().map(|r| r.name()).collect();
    let redemption: Vec<&str> = REDEMPTION_RULES.iter().map(|r| r.name()).collect();
    format!(
        "creation=[{}] redemption=[coupon_exists, {}]",
        creation.join(", "),
        redemption.join(", ")
    )
}
