//! Scoped admin panel tokens.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;
use utoipa::ToSchema;

use super::envelope::{Claims, Envelope, Minted, TokenSigner};
use super::error::{TokenError, VerifyFailure};

pub const ADMIN_TOKEN_ISSUER: &str = "alertachart-admin";
pub const ADMIN_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Partition of admin authority. A token minted for one scope never grants another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AdminScope {
    Main,
    Sales,
    Preusers,
}

impl AdminScope {
    pub const ALL: [Self; 3] = [Self::Main, Self::Sales, Self::Preusers];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Sales => "sales",
            Self::Preusers => "preusers",
        }
    }

    #[must_use]
    pub const fn cookie_name(self) -> &'static str {
        match self {
            Self::Main => "admin_auth",
            Self::Sales => "admin_sales_auth",
            Self::Preusers => "admin_preusers_auth",
        }
    }

    /// Path prefix the scope's cookie is restricted to.
    #[must_use]
    pub const fn cookie_path(self) -> &'static str {
        match self {
            Self::Main => "/admin",
            Self::Sales => "/admin/sales",
            Self::Preusers => "/admin/preusers",
        }
    }
}

impl fmt::Display for AdminScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "main" => Ok(Self::Main),
            "sales" => Ok(Self::Sales),
            "preusers" => Ok(Self::Preusers),
            other => Err(format!("unknown admin scope: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminClaims {
    pub scope: AdminScope,
    #[serde(rename = "iss")]
    pub issuer: String,
}

impl AdminClaims {
    #[must_use]
    pub fn new(scope: AdminScope) -> Self {
        Self {
            scope,
            issuer: ADMIN_TOKEN_ISSUER.to_string(),
        }
    }
}

impl Claims for AdminClaims {
    fn validate(&self) -> Result<(), VerifyFailure> {
        if self.issuer != ADMIN_TOKEN_ISSUER {
            return Err(VerifyFailure::InvalidPayload);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdminAuthError {
    #[error(transparent)]
    Invalid(#[from] VerifyFailure),
    #[error("token scope {actual} does not grant {required}")]
    ScopeMismatch {
        required: AdminScope,
        actual: AdminScope,
    },
}

/// Issues and checks admin tokens.
#[derive(Debug, Clone)]
pub struct AdminTokens {
    signer: TokenSigner,
    ttl: Duration,
}

impl AdminTokens {
    #[must_use]
    pub fn new(signer: TokenSigner) -> Self {
        Self {
            signer,
            ttl: ADMIN_TOKEN_TTL,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token for `scope`.
    ///
    /// # Errors
    /// Returns an error if the configured ttl is zero or encoding fails.
    pub fn issue(&self, scope: AdminScope) -> Result<Minted<AdminClaims>, TokenError> {
        self.signer.mint(AdminClaims::new(scope), self.ttl)
    }

    /// Verify signature, expiry and payload shape, exposing whichever scope the token holds.
    ///
    /// # Errors
    /// Returns the verification failure reason.
    pub fn verify(&self, token: &str) -> Result<Envelope<AdminClaims>, VerifyFailure> {
        self.signer.verify(token)
    }

    /// Verify and require the token to be bound to `required`.
    ///
    /// # Errors
    /// Returns `AdminAuthError::Invalid` for any verification failure and
    /// `AdminAuthError::ScopeMismatch` for a valid token of another scope.
    pub fn authorize(
        &self,
        token: &str,
        required: AdminScope,
    ) -> Result<Envelope<AdminClaims>, AdminAuthError> {
        let envelope = self.verify(token)?;
        if envelope.claims.scope != required {
            return Err(AdminAuthError::ScopeMismatch {
                required,
                actual: envelope.claims.scope,
            });
        }
        Ok(envelope)
    }
}
