// In-memory collaborators for unit and handler tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::coupons::error::StoreError;
use crate::coupons::models::Coupon;
use crate::coupons::repository::{CodeGenerator, CouponStore, OrderLedger, UserDirectory};

fn unavailable(flag: &AtomicBool) -> Result<(), StoreError> {
    if flag.load(Ordering::SeqCst) {
        Err(StoreError::Unavailable("injected failure".to_string()))
    } else {
        Ok(())
    }
}

/// Coupon store whose compare-and-swap runs under a single mutex
#[derive(Default)]
pub struct InMemoryCouponStore {
    coupons: Mutex<HashMap<String, Coupon>>,
    unavailable: AtomicBool,
    /// Uses consumed by a simulated competing redeemer right before each
    /// of the next decrements
    steal_queue: Mutex<VecDeque<i32>>,
    decrement_calls: AtomicU32,
}

impl InMemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coupon(coupon: Coupon) -> Self {
        let store = Self::new();
        store.put(coupon);
        store
    }

    pub fn put(&self, coupon: Coupon) {
        self.coupons
            .lock()
            .unwrap()
            .insert(coupon.coupon_code.clone(), coupon);
    }

    pub fn usage_of(&self, code: &str) -> Option<i32> {
        self.coupons.lock().unwrap().get(code).map(|c| c.usage)
    }

    pub fn force_usage(&self, code: &str, usage: i32) {
        if let Some(coupon) = self.coupons.lock().unwrap().get_mut(code) {
            coupon.usage = usage;
        }
    }

    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, Ordering::SeqCst);
    }

    /// Before the next decrement, let a competing redeemer take `uses`
    pub fn steal_before_decrement(&self, uses: i32) {
        self.steal_queue.lock().unwrap().push_back(uses);
    }

    pub fn decrement_calls(&self) -> u32 {
        self.decrement_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        unavailable(&self.unavailable)?;
        Ok(self.coupons.lock().unwrap().get(code).cloned())
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<(), StoreError> {
        unavailable(&self.unavailable)?;
        let mut coupons = self.coupons.lock().unwrap();
        if coupons.contains_key(&coupon.coupon_code) {
            return Err(StoreError::DuplicateCode(coupon.coupon_code.clone()));
        }
        coupons.insert(coupon.coupon_code.clone(), coupon.clone());
        Ok(())
    }

    async fn conditionally_decrement_usage(
        &self,
        code: &str,
        expected: i32,
    ) -> Result<bool, StoreError> {
        unavailable(&self.unavailable)?;
        self.decrement_calls.fetch_add(1, Ordering::SeqCst);
        let stolen = self.steal_queue.lock().unwrap().pop_front();

        let mut coupons = self.coupons.lock().unwrap();
        let Some(coupon) = coupons.get_mut(code) else {
            return Ok(false);
        };
        if let Some(uses) = stolen {
            coupon.usage = (coupon.usage - uses).max(0);
        }
        if coupon.usage == expected && coupon.usage > 0 {
            coupon.usage -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>, StoreError> {
        unavailable(&self.unavailable)?;
        let mut coupons: Vec<Coupon> = self.coupons.lock().unwrap().values().cloned().collect();
        coupons.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(coupons)
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(usernames: &[&str]) -> Self {
        let directory = Self::new();
        for username in usernames {
            directory.users.lock().unwrap().insert(username.to_string());
        }
        directory
    }

    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn user_exists(&self, username: &str) -> Result<bool, StoreError> {
        unavailable(&self.unavailable)?;
        Ok(self.users.lock().unwrap().contains(username))
    }
}

#[derive(Default)]
pub struct InMemoryOrderLedger {
    orders: Mutex<Vec<(String, DateTime<Utc>, bool)>>,
    unavailable: AtomicBool,
}

impl InMemoryOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, username: &str, placed_at: DateTime<Utc>, is_coupon: bool) {
        self.orders
            .lock()
            .unwrap()
            .push((username.to_string(), placed_at, is_coupon));
    }

    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrderLedger {
    async fn count_qualifying_orders(
        &self,
        username: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        unavailable(&self.unavailable)?;
        let count = self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, placed_at, is_coupon)| name == username && *placed_at >= since && !is_coupon)
            .count();
        Ok(count as i64)
    }
}

/// Hands out a fixed sequence of codes, then numbered fallbacks
#[derive(Default)]
pub struct SequenceCodeGenerator {
    codes: Mutex<VecDeque<String>>,
    issued: AtomicU32,
}

impl SequenceCodeGenerator {
    pub fn new(codes: &[&str]) -> Self {
        Self {
            codes: Mutex::new(codes.iter().map(|c| c.to_string()).collect()),
            issued: AtomicU32::new(0),
        }
    }
}

impl CodeGenerator for SequenceCodeGenerator {
    fn generate(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        self.codes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("CODE-{:04}", n))
    }
}
