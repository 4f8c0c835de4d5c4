use serde::Serialize;
use std::{fmt, time::Duration};

use crate::clock::duration_ms;

/// Named buckets of endpoints that share a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitCategory {
    /// Admin password login.
    Admin,
    /// Session restore and token minting for signed-in users.
    Auth,
    Trial,
    Purchase,
    Support,
    General,
}

impl RateLimitCategory {
    pub const ALL: [Self; 6] = [
        Self::Admin,
        Self::Auth,
        Self::Trial,
        Self::Purchase,
        Self::Support,
        Self::General,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Auth => "auth",
            Self::Trial => "trial",
            Self::Purchase => "purchase",
            Self::Support => "support",
            Self::General => "general",
        }
    }
}

impl fmt::Display for RateLimitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// At most `max_requests` hits per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    #[must_use]
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    #[must_use]
    pub fn window_ms(&self) -> i64 {
        duration_ms(self.window)
    }
}

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

/// Thresholds for every category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicies {
    admin: RateLimitPolicy,
    auth: RateLimitPolicy,
    trial: RateLimitPolicy,
    purchase: RateLimitPolicy,
    support: RateLimitPolicy,
    general: RateLimitPolicy,
}

impl Default for RateLimitPolicies {
    fn default() -> Self {
        Self {
            admin: RateLimitPolicy::new(5, Duration::from_secs(15 * 60)),
            auth: RateLimitPolicy::new(30, Duration::from_secs(15 * 60)),
            trial: RateLimitPolicy::new(3, HOUR),
            purchase: RateLimitPolicy::new(50, HOUR),
            support: RateLimitPolicy::new(5, HOUR),
            general: RateLimitPolicy::new(100, MINUTE),
        }
    }
}

impl RateLimitPolicies {
    #[must_use]
    pub const fn get(&self, category: RateLimitCategory) -> RateLimitPolicy {
        match category {
            RateLimitCategory::Admin => self.admin,
            RateLimitCategory::Auth => self.auth,
            RateLimitCategory::Trial => self.trial,
            RateLimitCategory::Purchase => self.purchase,
            RateLimitCategory::Support => self.support,
            RateLimitCategory::General => self.general,
        }
    }

    #[must_use]
    pub fn with(mut self, category: RateLimitCategory, policy: RateLimitPolicy) -> Self {
        let slot = match category {
            RateLimitCategory::Admin => &mut self.admin,
            RateLimitCategory::Auth => &mut self.auth,
            RateLimitCategory::Trial => &mut self.trial,
            RateLimitCategory::Purchase => &mut self.purchase,
            RateLimitCategory::Support => &mut self.support,
            RateLimitCategory::General => &mut self.general,
        };
        *slot = policy;
        self
    }
}
