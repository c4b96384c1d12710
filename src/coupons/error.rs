// Error types for coupon decisions and the stores behind them

use thiserror::Error;

use crate::coupons::rules::RejectionReason;

/// Failures raised by a coupon store or lookup collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u128,
    },

    #[error("Coupon code {0} already exists")]
    DuplicateCode(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a coupon operation that did not succeed
///
/// Only `Rejected` is a business answer. The remaining variants describe
/// infrastructure trouble, lost races, or invalid input.
#[derive(Debug, Error)]
pub enum CouponError {
    /// Refused by a rule; never retried automatically
    #[error("{0}")]
    Rejected(RejectionReason),

    /// Collaborator or store unavailable; safe for the caller to retry
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Lost the usage-counter race on every attempt
    #[error("redemption conflict, retry")]
    Conflict { attempts: u32 },

    /// Stored data breaks an invariant the store is supposed to uphold
    #[error("Coupon {code} is corrupt: {detail}")]
    Corrupted { code: String, detail: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type CouponResult<T> = Result<T, CouponError>;

impl From<StoreError> for CouponError {
    fn from(err: StoreError) -> Self {
        CouponError::Transient(err.to_string())
    }
}

impl From<RejectionReason> for CouponError {
    fn from(reason: RejectionReason) -> Self {
        CouponError::Rejected(reason)
    }
}

impl From<validator::ValidationErrors> for CouponError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CouponError::ValidationError(errors.to_string())
    }
}

impl CouponError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CouponError::Transient(_))
    }

    pub fn rejection(&self) -> Option<RejectionReason> {
        match self {
            CouponError::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}
