use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{RateLimitCategory, RateLimitDecision, RateLimitPolicies, RateLimiter};
use crate::clock::Clock;

/// How often expired windows are dropped from the table.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

type WindowKey = (String, RateLimitCategory);

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at_ms: i64,
}

/// Fixed-window counter per identity and category.
///
/// The first hit opens a window and later hits in the same window increment
/// it. A window whose end has passed is replaced by a fresh one, so a burst
/// straddling the boundary can see up to twice the limit.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    windows: Mutex<HashMap<WindowKey, Window>>,
    policies: RateLimitPolicies,
    clock: Arc<dyn Clock>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(policies: RateLimitPolicies, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            policies,
            clock,
        }
    }

    #[must_use]
    pub fn policies(&self) -> &RateLimitPolicies {
        &self.policies
    }

    fn table(&self) -> MutexGuard<'_, HashMap<WindowKey, Window>> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop every window that has ended.
    pub fn sweep(&self) {
        let now = self.clock.now_ms();
        let mut windows = self.table();
        let before = windows.len();
        windows.retain(|_, window| window.reset_at_ms > now);
        let removed = before - windows.len();
        if removed > 0 {
            debug!(removed, remaining = windows.len(), "Swept expired rate limit windows");
        }
    }

    /// Number of identity/category pairs currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.table().len()
    }

    /// Start a background task that sweeps every `interval`.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // The first tick completes immediately.
            timer.tick().await;
            loop {
                timer.tick().await;
                limiter.sweep();
            }
        })
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, identity: &str, category: RateLimitCategory) -> RateLimitDecision {
        let policy = self.policies.get(category);
        let now = self.clock.now_ms();

        // Read, compare and increment under one lock.
        let mut windows = self.table();
        let window = windows
            .entry((identity.to_string(), category))
            .or_insert(Window {
                count: 0,
                reset_at_ms: now,
            });
        if now >= window.reset_at_ms {
            *window = Window {
                count: 0,
                reset_at_ms: now.saturating_add(policy.window_ms()),
            };
        }

        if window.count >= policy.max_requests {
            let wait_ms = window.reset_at_ms.saturating_sub(now).max(1);
            return RateLimitDecision::Limited {
                limit: policy.max_requests,
                reset_at_ms: window.reset_at_ms,
                retry_after: Duration::from_millis(u64::try_from(wait_ms).unwrap_or(1)),
            };
        }

        window.count += 1;
        RateLimitDecision::Allowed {
            limit: policy.max_requests,
            remaining: policy.max_requests - window.count,
            reset_at_ms: window.reset_at_ms,
        }
    }

    fn reset(&self, identity: &str, category: RateLimitCategory) {
        self.table().remove(&(identity.to_string(), category));
    }
}
