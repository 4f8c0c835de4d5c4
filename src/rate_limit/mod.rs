//! Rate limiting for authentication-adjacent endpoints.
//!
//! Flow Overview:
//! 1) Resolve the caller identity (client IP) and the endpoint category.
//! 2) `check` counts the hit in a fixed window and returns a decision.
//! 3) Limited callers get a 429 with retry timing; the hit is not counted.
//!
//! The in-memory limiter is per process. Several instances each keep their own
//! counts and a restart clears them. [`RateLimiter`] is the seam for a shared
//! store.

mod fixed_window;
mod policy;

pub use fixed_window::{FixedWindowLimiter, SWEEP_INTERVAL};
pub use policy::{RateLimitCategory, RateLimitPolicies, RateLimitPolicy};

use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_at_ms: i64,
    },
    Limited {
        limit: u32,
        reset_at_ms: i64,
        retry_after: Duration,
    },
}

impl RateLimitDecision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

pub trait RateLimiter: Send + Sync {
    /// Count one hit for `identity` and decide whether it may proceed.
    fn check(&self, identity: &str, category: RateLimitCategory) -> RateLimitDecision;

    /// Forget the current window for `identity`.
    fn reset(&self, identity: &str, category: RateLimitCategory);
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _identity: &str, _category: RateLimitCategory) -> RateLimitDecision {
        RateLimitDecision::Allowed {
            limit: u32::MAX,
            remaining: u32::MAX,
            reset_at_ms: 0,
        }
    }

    fn reset(&self, _identity: &str, _category: RateLimitCategory) {}
}
