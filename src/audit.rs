//! Structured audit trail for security-relevant events.
//!
//! Events go through `tracing` under the `audit` target so they can be routed
//! or filtered independently (`RUST_LOG=audit=info`). Recording never fails the
//! request that triggered it.

use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use tracing::{error, info, warn};

use crate::rate_limit::RateLimitCategory;
use crate::token::{AdminScope, EmbedType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditCategory {
    Auth,
    Admin,
    Security,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auth => "auth",
            Self::Admin => "admin",
            Self::Security => "security",
        })
    }
}

impl fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent<'a> {
    AdminLogin {
        scope: AdminScope,
    },
    AdminLoginFailed {
        scope: AdminScope,
    },
    RateLimitExceeded {
        category: RateLimitCategory,
        endpoint: &'a str,
    },
    EmbedTokenIssued {
        user_id: i64,
        embed_type: EmbedType,
    },
    TokenRejected {
        kind: &'static str,
        reason: &'a str,
    },
}

impl AuditEvent<'_> {
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::AdminLogin { .. } => "admin_login",
            Self::AdminLoginFailed { .. } => "admin_login_failed",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::EmbedTokenIssued { .. } => "embed_token_issued",
            Self::TokenRejected { .. } => "token_rejected",
        }
    }

    #[must_use]
    pub const fn category(&self) -> AuditCategory {
        match self {
            Self::AdminLogin { .. } | Self::AdminLoginFailed { .. } => AuditCategory::Admin,
            Self::RateLimitExceeded { .. } | Self::TokenRejected { .. } => AuditCategory::Security,
            Self::EmbedTokenIssued { .. } => AuditCategory::Auth,
        }
    }

    #[must_use]
    pub const fn severity(&self) -> AuditSeverity {
        match self {
            Self::AdminLogin { .. } | Self::EmbedTokenIssued { .. } => AuditSeverity::Info,
            Self::AdminLoginFailed { .. }
            | Self::RateLimitExceeded { .. }
            | Self::TokenRejected { .. } => AuditSeverity::Warning,
        }
    }

    #[must_use]
    pub fn details(&self) -> Value {
        match self {
            Self::AdminLogin { scope } | Self::AdminLoginFailed { scope } => {
                json!({ "scope": scope })
            }
            Self::RateLimitExceeded { category, endpoint } => {
                json!({ "category": category, "endpoint": endpoint })
            }
            Self::EmbedTokenIssued {
                user_id,
                embed_type,
            } => json!({ "userId": user_id, "type": embed_type }),
            Self::TokenRejected { kind, reason } => json!({ "kind": kind, "reason": reason }),
        }
    }
}

/// Who triggered the event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext {
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl AuditContext {
    #[must_use]
    pub fn new(ip_address: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent,
        }
    }
}

macro_rules! audit_event {
    ($level:ident, $event:expr, $context:expr, $details:expr) => {
        $level!(
            target: "audit",
            action = $event.action(),
            category = %$event.category(),
            severity = %$event.severity(),
            ip_address = %$context.ip_address,
            user_agent = $context.user_agent.as_deref().unwrap_or("-"),
            details = %$details,
            "audit event"
        )
    };
}

pub fn record(event: AuditEvent<'_>, context: &AuditContext) {
    let details = event.details();
    match event.severity() {
        AuditSeverity::Info => audit_event!(info, event, context, details),
        AuditSeverity::Warning => audit_event!(warn, event, context, details),
        AuditSeverity::Error => audit_event!(error, event, context, details),
    }
}
