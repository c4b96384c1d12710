use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;

use crate::coupons::error::StoreError;
use crate::coupons::models::{Coupon, CouponRow};

/// Persistent coupon storage
///
/// `conditionally_decrement_usage` is the only write path for the usage
/// counter. It must be a single atomic compare-and-swap in the backing store.
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Point lookup by code. `Ok(None)` when no such coupon exists.
    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>, StoreError>;

    /// Persist a newly created coupon
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<(), StoreError>;

    /// Decrement the usage counter by one iff it currently equals `expected`
    /// and is positive. Returns `Ok(false)` when the condition did not hold.
    async fn conditionally_decrement_usage(
        &self,
        code: &str,
        expected: i32,
    ) -> Result<bool, StoreError>;

    /// All coupons, newest first
    async fn list_coupons(&self) -> Result<Vec<Coupon>, StoreError>;
}

/// "Does this username exist"
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, username: &str) -> Result<bool, StoreError>;
}

/// Order history lookups
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Count orders for `username` placed on or after `since` that were not
    /// themselves paid with a coupon
    async fn count_qualifying_orders(
        &self,
        username: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError>;
}

/// Source of unique opaque coupon codes
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Run a store call under a deadline, turning an elapsed deadline into
/// `StoreError::Timeout`
pub async fn with_timeout<T, F>(
    limit: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            operation,
            timeout_ms: limit.as_millis(),
        }),
    }
}

const COUPON_COLUMNS: &str = "id, coupon_code, discount_percent, remaining_usage, expiry_date, \
     min_order_amount, min_order_items, profile_username, profile_frequent, \
     history_min_orders, history_since, history_username, created_at";

/// PostgreSQL-backed coupon store
#[derive(Clone)]
pub struct PgCouponRepository {
    pool: PgPool,
}

impl PgCouponRepository {
    /// Create a new PgCouponRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CouponStore for PgCouponRepository {
    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE coupon_code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Coupon::from))
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<(), StoreError> {
        let (min_order_amount, min_order_items) = match &coupon.order_content {
            Some(content) => (Some(content.min_amount), Some(content.min_items)),
            None => (None, None),
        };
        let (history_min_orders, history_since, history_username) = match &coupon.order_history {
            Some(history) => (
                Some(history.min_orders),
                Some(history.since),
                history.username.clone(),
            ),
            None => (None, None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, coupon_code, discount_percent, remaining_usage, expiry_date,
                min_order_amount, min_order_items, profile_username, profile_frequent,
                history_min_orders, history_since, history_username, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(coupon.id)
        .bind(&coupon.coupon_code)
        .bind(coupon.discount_percent)
        .bind(coupon.usage)
        .bind(coupon.expiry_date)
        .bind(min_order_amount)
        .bind(min_order_items)
        .bind(coupon.profile.as_ref().map(|p| p.username.as_str()))
        .bind(coupon.profile.as_ref().is_some_and(|p| p.frequent))
        .bind(history_min_orders)
        .bind(history_since)
        .bind(history_username)
        .bind(coupon.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return StoreError::DuplicateCode(coupon.coupon_code.clone());
                }
            }
            StoreError::DatabaseError(e)
        })?;

        Ok(())
    }

    async fn conditionally_decrement_usage(
        &self,
        code: &str,
        expected: i32,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET remaining_usage = remaining_usage - 1
            WHERE coupon_code = $1
              AND remaining_usage = $2
              AND remaining_usage > 0
            "#,
        )
        .bind(code)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>, StoreError> {
        let rows = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Coupon::from).collect())
    }
}

/// User directory backed by the `users` table
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn user_exists(&self, username: &str) -> Result<bool, StoreError> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists.0)
    }
}

/// Order ledger backed by the `orders` table
#[derive(Clone)]
pub struct PgOrderLedger {
    pool: PgPool,
}

impl PgOrderLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderLedger for PgOrderLedger {
    async fn count_qualifying_orders(
        &self,
        username: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM orders
            WHERE username = $1
              AND placed_at >= $2
              AND is_coupon = FALSE
            "#,
        )
        .bind(username)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}
