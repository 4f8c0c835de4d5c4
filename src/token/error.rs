use thiserror::Error;

/// Failures while minting a token. These are server-side problems, never the
/// caller's fault.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signing secret is not configured")]
    MissingSecret,
    #[error("token ttl must be positive")]
    InvalidTtl,
    #[error("invalid signing key")]
    Key,
    #[error("failed to encode token payload")]
    Encode(#[from] serde_json::Error),
}

/// Why a presented token was rejected.
///
/// Callers must treat every variant as "unauthorized"; the distinction exists
/// for logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyFailure {
    #[error("invalid token format")]
    Malformed,
    #[error("invalid signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid token payload")]
    InvalidPayload,
}

impl VerifyFailure {
    /// Stable identifier used in logs and audit events.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
            Self::InvalidPayload => "invalid_payload",
        }
    }
}
