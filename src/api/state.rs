//! Shared state handed to every handler through an `Extension`.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, sync::Arc};
use subtle::ConstantTimeEq;

use crate::{
    clock::Clock,
    premium::AccountStore,
    rate_limit::RateLimiter,
    safe_error::{DeploymentMode, SafeErrorFormatter},
    token::{AdminScope, AdminTokens, EmbedTokens},
};

/// Operator-configured admin credentials.
///
/// The main scope needs a username and password; the sales and preusers
/// scopes are password only. Preusers falls back to the sales password.
#[derive(Clone, Default)]
pub struct AdminCredentials {
    username: Option<String>,
    password: Option<SecretString>,
    sales_password: Option<SecretString>,
    preusers_password: Option<SecretString>,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("sales_password", &self.sales_password.as_ref().map(|_| "[REDACTED]"))
            .field(
                "preusers_password",
                &self.preusers_password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl AdminCredentials {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into()).filter(|value: &String| !value.is_empty());
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = non_empty(password);
        self
    }

    #[must_use]
    pub fn with_sales_password(mut self, password: SecretString) -> Self {
        self.sales_password = non_empty(password);
        self
    }

    #[must_use]
    pub fn with_preusers_password(mut self, password: SecretString) -> Self {
        self.preusers_password = non_empty(password);
        self
    }

    #[must_use]
    pub fn password_for(&self, scope: AdminScope) -> Option<&SecretString> {
        match scope {
            AdminScope::Main => self.password.as_ref(),
            AdminScope::Sales => self.sales_password.as_ref(),
            AdminScope::Preusers => self
                .preusers_password
                .as_ref()
                .or(self.sales_password.as_ref()),
        }
    }

    /// Whether `scope` can be logged into at all.
    #[must_use]
    pub fn is_configured(&self, scope: AdminScope) -> bool {
        let username_ok = scope != AdminScope::Main || self.username.is_some();
        username_ok && self.password_for(scope).is_some()
    }

    /// Constant-time check of the presented credentials.
    ///
    /// Returns `None` when the scope is not configured.
    #[must_use]
    pub fn matches(&self, scope: AdminScope, username: Option<&str>, password: &str) -> Option<bool> {
        if !self.is_configured(scope) {
            return None;
        }
        let expected_password = self.password_for(scope)?;
        let password_ok: bool = expected_password
            .expose_secret()
            .as_bytes()
            .ct_eq(password.as_bytes())
            .into();
        let username_ok: bool = match (scope, self.username.as_deref()) {
            (AdminScope::Main, Some(expected)) => expected
                .as_bytes()
                .ct_eq(username.unwrap_or_default().as_bytes())
                .into(),
            (AdminScope::Main, None) => false,
            _ => true,
        };
        Some(password_ok & username_ok)
    }
}

fn non_empty(secret: SecretString) -> Option<SecretString> {
    (!secret.expose_secret().is_empty()).then_some(secret)
}

/// HTTP-facing settings.
#[derive(Clone, Debug, Default)]
pub struct ApiConfig {
    mode: DeploymentMode,
    frontend_base_url: Option<String>,
    admin: AdminCredentials,
}

impl ApiConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mode(mut self, mode: DeploymentMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_frontend_base_url(mut self, url: impl Into<String>) -> Self {
        self.frontend_base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_admin(mut self, admin: AdminCredentials) -> Self {
        self.admin = admin;
        self
    }

    #[must_use]
    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> Option<&str> {
        self.frontend_base_url.as_deref()
    }

    #[must_use]
    pub fn admin(&self) -> &AdminCredentials {
        &self.admin
    }

    /// Cookies carry `Secure` in production.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.mode.is_production()
    }
}

pub struct AppState {
    config: ApiConfig,
    admin_tokens: AdminTokens,
    embed_tokens: EmbedTokens,
    rate_limiter: Arc<dyn RateLimiter>,
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    errors: SafeErrorFormatter,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("admin_tokens", &self.admin_tokens)
            .field("embed_tokens", &self.embed_tokens)
            .finish_non_exhaustive()
    }
}

impl AppState {
    #[must_use]
    pub fn new(
        config: ApiConfig,
        admin_tokens: AdminTokens,
        embed_tokens: EmbedTokens,
        rate_limiter: Arc<dyn RateLimiter>,
        accounts: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let errors = SafeErrorFormatter::new(config.mode());
        Self {
            config,
            admin_tokens,
            embed_tokens,
            rate_limiter,
            accounts,
            clock,
            errors,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    #[must_use]
    pub fn admin_tokens(&self) -> &AdminTokens {
        &self.admin_tokens
    }

    #[must_use]
    pub fn embed_tokens(&self) -> &EmbedTokens {
        &self.embed_tokens
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    #[must_use]
    pub fn accounts(&self) -> &dyn AccountStore {
        self.accounts.as_ref()
    }

    #[must_use]
    pub fn errors(&self) -> &SafeErrorFormatter {
        &self.errors
    }

    /// Current time from the injected clock, for entitlement checks.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.clock.now_ms()).unwrap_or_default()
    }
}
