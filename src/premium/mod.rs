//! Premium entitlement.
//!
//! A user has premium access while a premium plan is unexpired or a trial is
//! running. Trials without an explicit end last three days from their start.

mod store;

pub use store::{AccountStore, MemoryAccountStore, PgAccountStore, StoreError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Trial length when no explicit end is recorded.
pub const TRIAL_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Premium,
}

impl Plan {
    /// Anything other than `premium` is the free plan.
    #[must_use]
    pub fn from_db(value: &str) -> Self {
        if value.eq_ignore_ascii_case("premium") {
            Self::Premium
        } else {
            Self::Free
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub plan: Plan,
    pub expiry_date: Option<DateTime<Utc>>,
    pub trial_started_at: Option<DateTime<Utc>>,
    pub trial_ended_at: Option<DateTime<Utc>>,
}

impl Account {
    #[must_use]
    pub fn new(id: i64, email: impl Into<String>, plan: Plan) -> Self {
        Self {
            id,
            email: email.into(),
            plan,
            expiry_date: None,
            trial_started_at: None,
            trial_ended_at: None,
        }
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry_date: DateTime<Utc>) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }

    #[must_use]
    pub fn with_trial(mut self, started_at: DateTime<Utc>, ended_at: Option<DateTime<Utc>>) -> Self {
        self.trial_started_at = Some(started_at);
        self.trial_ended_at = ended_at;
        self
    }

    /// Premium plan with no expiry (lifetime) or an expiry still ahead.
    #[must_use]
    pub fn is_premium(&self, now: DateTime<Utc>) -> bool {
        self.plan == Plan::Premium && self.expiry_date.map_or(true, |expiry| expiry > now)
    }

    #[must_use]
    pub fn trial_end(&self) -> Option<DateTime<Utc>> {
        let start = self.trial_started_at?;
        Some(self.trial_ended_at.unwrap_or(start + Duration::days(TRIAL_DAYS)))
    }

    #[must_use]
    pub fn is_trial_active(&self, now: DateTime<Utc>) -> bool {
        match (self.trial_started_at, self.trial_end()) {
            (Some(start), Some(end)) => start <= now && now < end,
            _ => false,
        }
    }

    #[must_use]
    pub fn has_premium_access(&self, now: DateTime<Utc>) -> bool {
        self.is_premium(now) || self.is_trial_active(now)
    }
}
