use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::coupons::engine::{DecisionEngine, EngineSettings};
use crate::coupons::error::{CouponError, CouponResult, StoreError};
use crate::coupons::metrics::{DecisionMetrics, Outcome};
use crate::coupons::models::{Coupon, CreateCouponRequest, RedeemCouponRequest, RedeemResponse};
use crate::coupons::redemption::RedemptionOrchestrator;
use crate::coupons::repository::{
    with_timeout, CodeGenerator, CouponStore, OrderLedger, UserDirectory,
};
use crate::coupons::rules::RejectionReason;

/// Fresh codes tried before giving up on an insert
const MAX_CODE_ATTEMPTS: u32 = 3;

/// Service layer for coupon creation and redemption
#[derive(Clone)]
pub struct CouponService {
    engine: DecisionEngine,
    orchestrator: RedemptionOrchestrator,
    store: Arc<dyn CouponStore>,
    codes: Arc<dyn CodeGenerator>,
    settings: EngineSettings,
    metrics: DecisionMetrics,
}

impl CouponService {
    /// Create a new CouponService
    pub fn new(
        store: Arc<dyn CouponStore>,
        users: Arc<dyn UserDirectory>,
        orders: Arc<dyn OrderLedger>,
        codes: Arc<dyn CodeGenerator>,
        settings: EngineSettings,
        metrics: DecisionMetrics,
    ) -> Self {
        let engine = DecisionEngine::new(store.clone(), users, orders, settings.lookup_timeout);
        let orchestrator = RedemptionOrchestrator::new(
            engine.clone(),
            store.clone(),
            settings.max_attempts,
            settings.lookup_timeout,
            metrics.clone(),
        );

        Self {
            engine,
            orchestrator,
            store,
            codes,
            settings,
            metrics,
        }
    }

    pub fn metrics(&self) -> &DecisionMetrics {
        &self.metrics
    }

    /// Create a new coupon
    ///
    /// This method:
    /// 1. Validates the candidate's field ranges
    /// 2. Runs the creation rules against the candidate
    /// 3. Assigns a freshly generated code
    /// 4. Persists the coupon, drawing a new code if the first one is taken
    pub async fn create_coupon(&self, candidate: CreateCouponRequest) -> CouponResult<Coupon> {
        let _timer = self.metrics.start_decision("creation");

        let result = self.create(candidate).await;
        match &result {
            Ok(coupon) => {
                self.metrics.record(Outcome::Created);
                tracing::info!(
                    "Created coupon {} ({}% off, {} uses)",
                    coupon.coupon_code,
                    coupon.discount_percent,
                    coupon.usage
                );
            }
            Err(CouponError::Rejected(reason)) => {
                self.metrics.record(Outcome::CreationRejected);
                tracing::debug!("Coupon creation rejected: {}", reason);
            }
            Err(CouponError::ValidationError(detail)) => {
                tracing::debug!("Coupon candidate failed validation: {}", detail);
            }
            Err(e) => self.record_failure(e),
        }
        result
    }

    async fn create(&self, candidate: CreateCouponRequest) -> CouponResult<Coupon> {
        candidate.validate()?;

        let verdict = self.engine.decide_creation(&candidate).await?;
        if let Some(reason) = verdict.reason {
            return Err(reason.into());
        }

        let (discount_percent, usage, expiry_date) =
            match (candidate.discount_percent, candidate.usage, candidate.expiry_date) {
                (Some(discount), Some(usage), Some(expiry)) => (discount, usage, expiry),
                _ => return Err(RejectionReason::MissingRequiredFields.into()),
            };

        let mut coupon = Coupon {
            id: Uuid::new_v4(),
            coupon_code: String::new(),
            discount_percent,
            usage,
            expiry_date,
            order_content: candidate.order_content,
            profile: candidate.profile,
            order_history: candidate.order_history,
            created_at: Utc::now(),
        };

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            coupon.coupon_code = self.codes.generate();
            match with_timeout(
                self.settings.lookup_timeout,
                "insert_coupon",
                self.store.insert_coupon(&coupon),
            )
            .await
            {
                Ok(()) => return Ok(coupon),
                Err(StoreError::DuplicateCode(code)) => {
                    tracing::warn!(
                        "Generated code {} already taken (attempt {}/{})",
                        code,
                        attempt,
                        MAX_CODE_ATTEMPTS
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CouponError::Transient(format!(
            "no unused coupon code after {} attempts",
            MAX_CODE_ATTEMPTS
        )))
    }

    /// Redeem one use of a coupon against an order
    ///
    /// A request that fails field validation never reaches the rules or the
    /// usage counter.
    pub async fn redeem_coupon(&self, request: RedeemCouponRequest) -> CouponResult<RedeemResponse> {
        let _timer = self.metrics.start_decision("redemption");

        let result = match request.validate() {
            Ok(()) => self.orchestrator.redeem(&request).await,
            Err(errors) => Err(errors.into()),
        };
        match &result {
            Ok(_) => self.metrics.record(Outcome::Redeemed),
            Err(CouponError::Rejected(_)) => self.metrics.record(Outcome::RedemptionRejected),
            Err(CouponError::Conflict { .. }) => self.metrics.record(Outcome::Conflict),
            Err(e) => self.record_failure(e),
        }
        result
    }

    /// All coupons, newest first
    pub async fn list_coupons(&self) -> CouponResult<Vec<Coupon>> {
        let coupons = with_timeout(
            self.settings.lookup_timeout,
            "list_coupons",
            self.store.list_coupons(),
        )
        .await
        .map_err(|e| {
            let e = CouponError::from(e);
            self.record_failure(&e);
            e
        })?;

        tracing::debug!("Retrieved {} coupons", coupons.len());
        Ok(coupons)
    }

    fn record_failure(&self, error: &CouponError) {
        // Corruption is logged where it is detected
        if let CouponError::Transient(detail) = error {
            self.metrics.record(Outcome::Transient);
            tracing::warn!("Coupon operation failed transiently: {}", detail);
        }
    }
}
