// Redemption orchestration
//
// Runs the redemption rules and then claims one use through the store's
// compare-and-swap, re-deciding against fresh data whenever the swap loses.

use std::sync::Arc;
use std::time::Duration;

use crate::coupons::engine::DecisionEngine;
use crate::coupons::error::{CouponError, CouponResult};
use crate::coupons::metrics::DecisionMetrics;
use crate::coupons::models::{RedeemCouponRequest, RedeemResponse};
use crate::coupons::repository::{with_timeout, CouponStore};
use crate::coupons::rules::RejectionReason;

#[derive(Clone)]
pub struct RedemptionOrchestrator {
    engine: DecisionEngine,
    store: Arc<dyn CouponStore>,
    max_attempts: u32,
    store_timeout: Duration,
    metrics: DecisionMetrics,
}

impl RedemptionOrchestrator {
    pub fn new(
        engine: DecisionEngine,
        store: Arc<dyn CouponStore>,
        max_attempts: u32,
        store_timeout: Duration,
        metrics: DecisionMetrics,
    ) -> Self {
        Self {
            engine,
            store,
            max_attempts: max_attempts.max(1),
            store_timeout,
            metrics,
        }
    }

    /// Redeem one use of the coupon named in `request`
    ///
    /// # Arguments
    /// * `request` - The order the coupon is applied to
    ///
    /// # Returns
    /// * `Ok(RedeemResponse)` - One use was consumed; carries the remaining count
    /// * `Err(CouponError::Rejected)` - A rule refused the redemption; nothing changed
    /// * `Err(CouponError::Conflict)` - Every compare-and-swap attempt lost the race
    /// * `Err(CouponError::Transient)` - A store or collaborator call failed or timed out
    pub async fn redeem(&self, request: &RedeemCouponRequest) -> CouponResult<RedeemResponse> {
        let mut coupon = self.engine.fetch_coupon(&request.coupon_code).await?;

        for attempt in 1..=self.max_attempts {
            let verdict = self.engine.decide_redemption(&coupon, request).await?;
            if let Some(reason) = verdict.reason {
                return Err(reason.into());
            }

            let applied = with_timeout(
                self.store_timeout,
                "conditionally_decrement_usage",
                self.store
                    .conditionally_decrement_usage(&coupon.coupon_code, coupon.usage),
            )
            .await?;

            if applied {
                tracing::info!(
                    "Coupon {} redeemed by '{}' on attempt {}, {} uses left",
                    coupon.coupon_code,
                    request.username,
                    attempt,
                    coupon.usage - 1
                );
                return Ok(RedeemResponse {
                    redeem_status: true,
                    remaining_usage: coupon.usage - 1,
                    coupon_code: coupon.coupon_code,
                });
            }

            // Someone else moved the counter; look again before deciding
            coupon = self.engine.fetch_coupon(&request.coupon_code).await?;
            if coupon.usage == 0 {
                tracing::debug!(
                    "Coupon {} ran out while '{}' was redeeming",
                    coupon.coupon_code,
                    request.username
                );
                return Err(RejectionReason::UsageExhausted.into());
            }

            if attempt < self.max_attempts {
                self.metrics.record_retry();
                tracing::debug!(
                    "Lost usage race on {} (attempt {}/{}), retrying",
                    coupon.coupon_code,
                    attempt,
                    self.max_attempts
                );
            }
        }

        tracing::warn!(
            "Redemption of {} by '{}' gave up after {} attempts",
            request.coupon_code,
            request.username,
            self.max_attempts
        );
        Err(CouponError::Conflict {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupons::memory::{InMemoryCouponStore, InMemoryOrderLedger, InMemoryUserDirectory};
    use crate::coupons::models::{Coupon, OrderContent};
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn flat10(usage: i32) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            coupon_code: "FLAT10".to_string(),
            discount_percent: dec!(10),
            usage,
            expiry_date: Utc::now() + ChronoDuration::days(30),
            order_content: Some(OrderContent { min_amount: dec!(50), min_items: 2 }),
            profile: None,
            order_history: None,
            created_at: Utc::now(),
        }
    }

    fn order(amount: Decimal, items: i32) -> RedeemCouponRequest {
        RedeemCouponRequest {
            coupon_code: "FLAT10".to_string(),
            order_amount: amount,
            num_items: items,
            username: "x".to_string(),
        }
    }

    fn orchestrator(store: Arc<InMemoryCouponStore>, max_attempts: u32) -> RedemptionOrchestrator {
        let timeout = Duration::from_millis(500);
        let engine = DecisionEngine::new(
            store.clone(),
            Arc::new(InMemoryUserDirectory::new()),
            Arc::new(InMemoryOrderLedger::new()),
            timeout,
        );
        RedemptionOrchestrator::new(engine, store, max_attempts, timeout, DecisionMetrics::new())
    }

    #[tokio::test]
    async fn test_redeem_last_use() {
        let store = Arc::new(InMemoryCouponStore::with_coupon(flat10(1)));
        let orchestrator = orchestrator(store.clone(), 3);

        let response = orchestrator.redeem(&order(dec!(100), 3)).await.unwrap();
        assert!(response.redeem_status);
        assert_eq!(response.coupon_code, "FLAT10");
        assert_eq!(response.remaining_usage, 0);
        assert_eq!(store.usage_of("FLAT10"), Some(0));

        let err = orchestrator.redeem(&order(dec!(100), 3)).await.unwrap_err();
        assert_eq!(err.rejection(), Some(RejectionReason::UsageExhausted));
        assert_eq!(store.usage_of("FLAT10"), Some(0));
    }

    #[tokio::test]
    async fn test_exhausted_reported_before_order_content() {
        let store = Arc::new(InMemoryCouponStore::with_coupon(flat10(0)));
        let orchestrator = orchestrator(store.clone(), 3);

        let err = orchestrator.redeem(&order(dec!(10), 1)).await.unwrap_err();
        assert_eq!(err.to_string(), "coupon usage exhausted");
        assert_eq!(store.decrement_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejection_leaves_usage_untouched() {
        let store = Arc::new(InMemoryCouponStore::with_coupon(flat10(5)));
        let orchestrator = orchestrator(store.clone(), 3);

        let err = orchestrator.redeem(&order(dec!(10), 3)).await.unwrap_err();
        assert_eq!(err.rejection(), Some(RejectionReason::OrderContentBelowMinimum));
        assert_eq!(store.usage_of("FLAT10"), Some(5));
        assert_eq!(store.decrement_calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_coupon_is_rejected() {
        let mut coupon = flat10(5);
        coupon.expiry_date = Utc::now() - ChronoDuration::days(1);
        let store = Arc::new(InMemoryCouponStore::with_coupon(coupon));
        let orchestrator = orchestrator(store.clone(), 3);

        let err = orchestrator.redeem(&order(dec!(100), 3)).await.unwrap_err();
        assert_eq!(err.rejection(), Some(RejectionReason::CouponExpired));
        assert_eq!(store.usage_of("FLAT10"), Some(5));
    }

    #[tokio::test]
    async fn test_unknown_coupon() {
        let store = Arc::new(InMemoryCouponStore::new());
        let orchestrator = orchestrator(store, 3);

        let err = orchestrator.redeem(&order(dec!(100), 3)).await.unwrap_err();
        assert_eq!(err.rejection(), Some(RejectionReason::CouponNotFound));
    }

    #[tokio::test]
    async fn test_lost_race_is_retried_with_fresh_count() {
        let store = Arc::new(InMemoryCouponStore::with_coupon(flat10(5)));
        store.steal_before_decrement(1);
        let orchestrator = orchestrator(store.clone(), 3);

        let response = orchestrator.redeem(&order(dec!(100), 3)).await.unwrap();
        assert_eq!(response.remaining_usage, 3);
        assert_eq!(store.usage_of("FLAT10"), Some(3));
        assert_eq!(store.decrement_calls(), 2);
    }

    #[tokio::test]
    async fn test_lost_race_on_last_use_is_exhausted() {
        let store = Arc::new(InMemoryCouponStore::with_coupon(flat10(1)));
        store.steal_before_decrement(1);
        let orchestrator = orchestrator(store.clone(), 3);

        let err = orchestrator.redeem(&order(dec!(100), 3)).await.unwrap_err();
        assert_eq!(err.rejection(), Some(RejectionReason::UsageExhausted));
        assert_eq!(store.decrement_calls(), 1);
        assert_eq!(store.usage_of("FLAT10"), Some(0));
    }

    #[tokio::test]
    async fn test_conflict_after_max_attempts() {
        let store = Arc::new(InMemoryCouponStore::with_coupon(flat10(10)));
        for _ in 0..3 {
            store.steal_before_decrement(1);
        }
        let orchestrator = orchestrator(store.clone(), 3);

        let err = orchestrator.redeem(&order(dec!(100), 3)).await.unwrap_err();
        assert!(matches!(err, CouponError::Conflict { attempts: 3 }));
        assert_eq!(err.to_string(), "redemption conflict, retry");
        assert_eq!(store.decrement_calls(), 3);
        assert_eq!(store.usage_of("FLAT10"), Some(7));
    }

    #[tokio::test]
    async fn test_retries_are_counted() {
        let store = Arc::new(InMemoryCouponStore::with_coupon(flat10(10)));
        store.steal_before_decrement(1);
        store.steal_before_decrement(1);
        let metrics = DecisionMetrics::new();
        let timeout = Duration::from_millis(500);
        let engine = DecisionEngine::new(
            store.clone(),
            Arc::new(InMemoryUserDirectory::new()),
            Arc::new(InMemoryOrderLedger::new()),
            timeout,
        );
        let orchestrator =
            RedemptionOrchestrator::new(engine, store.clone(), 3, timeout, metrics.clone());

        orchestrator.redeem(&order(dec!(100), 3)).await.unwrap();
        assert_eq!(metrics.summary().redemption_retries, 2);
    }

    #[tokio::test]
    async fn test_store_outage_is_transient() {
        let store = Arc::new(InMemoryCouponStore::with_coupon(flat10(5)));
        store.set_unavailable(true);
        let orchestrator = orchestrator(store, 3);

        let err = orchestrator.redeem(&order(dec!(100), 3)).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_corrupt_usage_is_not_redeemed() {
        let store = Arc::new(InMemoryCouponStore::with_coupon(flat10(5)));
        store.force_usage("FLAT10", -2);
        let orchestrator = orchestrator(store.clone(), 3);

        let err = orchestrator.redeem(&order(dec!(100), 3)).await.unwrap_err();
        assert!(matches!(err, CouponError::Corrupted { .. }));
        assert_eq!(store.decrement_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redeemers_never_oversell() {
        const USES: i32 = 5;
        const REDEEMERS: usize = 24;

        let store = Arc::new(InMemoryCouponStore::with_coupon(flat10(USES)));
        // Every lost swap means another redeemer won, so USES + 1 attempts
        // always reach either success or exhaustion
        let orchestrator = orchestrator(store.clone(), USES as u32 + 1);

        let handles: Vec<_> = (0..REDEEMERS)
            .map(|_| {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move { orchestrator.redeem(&order(dec!(100), 3)).await })
            })
            .collect();

        let mut succeeded = 0;
        let mut exhausted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(e) if e.rejection() == Some(RejectionReason::UsageExhausted) => exhausted += 1,
                Err(e) => panic!("unexpected redemption error: {e}"),
            }
        }

        assert_eq!(succeeded, USES as usize);
        assert_eq!(exhausted, REDEEMERS - USES as usize);
        assert_eq!(store.usage_of("FLAT10"), Some(0));
    }
}
