// Coupon Decision Engine
//
// Resolves collaborator facts, builds the rule context and runs the matching
// rule set. Read-only: the usage counter is only touched by the redemption
// orchestrator.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::coupons::context::RuleContextBuilder;
use crate::coupons::error::{CouponError, CouponResult};
use crate::coupons::models::{Coupon, CreateCouponRequest, RedeemCouponRequest};
use crate::coupons::repository::{with_timeout, CouponStore, OrderLedger, UserDirectory};
use crate::coupons::rules::{self, RejectionReason, Verdict};

/// Deadline for each collaborator or store call (3 seconds)
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Compare-and-swap attempts per redemption before reporting a conflict
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Tunables shared by the engine and the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub lookup_timeout: Duration,
    pub max_attempts: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Clone)]
pub struct DecisionEngine {
    store: Arc<dyn CouponStore>,
    contexts: RuleContextBuilder,
    lookup_timeout: Duration,
}

impl DecisionEngine {
    pub fn new(
        store: Arc<dyn CouponStore>,
        users: Arc<dyn UserDirectory>,
        orders: Arc<dyn OrderLedger>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            store,
            contexts: RuleContextBuilder::new(users, orders, lookup_timeout),
            lookup_timeout,
        }
    }

    /// Decide whether `candidate` may be created
    pub async fn decide_creation(&self, candidate: &CreateCouponRequest) -> CouponResult<Verdict> {
        let ctx = self.contexts.for_creation(candidate, Utc::now()).await?;
        let verdict = rules::evaluate_creation(&ctx);

        if !verdict.passed {
            tracing::debug!("Coupon creation rejected: {}", verdict.message());
        }
        Ok(verdict)
    }

    /// Load a coupon for redemption
    ///
    /// A missing coupon is reported as a rejection, the same way a failed
    /// rule is. A negative stored count means the store broke its own
    /// contract and is reported as corruption.
    pub async fn fetch_coupon(&self, code: &str) -> CouponResult<Coupon> {
        let coupon = with_timeout(self.lookup_timeout, "get_coupon", self.store.get_coupon(code))
            .await?
            .ok_or_else(|| {
                tracing::debug!("Coupon {} not found", code);
                CouponError::Rejected(RejectionReason::CouponNotFound)
            })?;

        if coupon.usage < 0 {
            tracing::error!(
                "Coupon {} has negative remaining usage {}; usage counter integrity violated",
                code,
                coupon.usage
            );
            return Err(CouponError::Corrupted {
                code: code.to_string(),
                detail: format!("remaining usage is {}", coupon.usage),
            });
        }

        Ok(coupon)
    }

    /// Decide whether `request` may redeem the already loaded `coupon`
    pub async fn decide_redemption(
        &self,
        coupon: &Coupon,
        request: &RedeemCouponRequest,
    ) -> CouponResult<Verdict> {
        let ctx = self
            .contexts
            .for_redemption(coupon, request, Utc::now())
            .await?;
        let verdict = rules::evaluate_redemption(&ctx);

        if !verdict.passed {
            tracing::debug!(
                "Redemption of {} by '{}' rejected: {}",
                coupon.coupon_code,
                request.username,
                verdict.message()
            );
        }
        Ok(verdict)
    }
}
