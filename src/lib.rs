//! # Alerta (admin and premium-embed token service)
//!
//! `alerta` is the security core of the Alerta Chart web tier. It mints and
//! verifies self-contained bearer tokens and throttles authentication-adjacent
//! endpoints.
//!
//! ## Tokens
//!
//! Tokens are `base64url(json(payload)) + "." + base64url(hmac_sha256(payload_b64))`.
//! They carry their own `issuedAt`/`expiresAt` (ms epoch) and are never stored
//! server side: possession of an unexpired, correctly signed token is the
//! authorization. There is no revocation list.
//!
//! - **Admin tokens** are bound to a scope (`main`, `sales`, `preusers`), live
//!   24 hours and travel in an `HttpOnly` cookie restricted to the scope's
//!   `/admin` path.
//! - **Embed tokens** authorize a single premium embed load (`aggr` or
//!   `liquidation`), live 5 minutes and are returned in the JSON body.
//!
//! ## Rate limiting
//!
//! A process-local fixed-window counter keyed by client identity and category.
//! A restart clears every counter, and several instances do not share counts.
//!
//! ## Errors
//!
//! Every client-facing failure goes through [`safe_error::SafeErrorFormatter`],
//! which only leaks error detail outside production.

pub mod api;
pub mod audit;
pub mod cli;
pub mod clock;
pub mod premium;
pub mod rate_limit;
pub mod safe_error;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
