//! Self-contained HMAC-signed bearer tokens.
//!
//! Flow Overview:
//! 1) Stamp `issuedAt`/`expiresAt` (and a nonce when the claims ask for one).
//! 2) Serialize the envelope to JSON and base64url-encode it.
//! 3) HMAC-SHA256 the encoded payload with the server secret.
//! 4) Verify in the reverse order: structure, signature, expiry, schema.

mod admin;
mod embed;
mod envelope;
mod error;

pub use admin::{ADMIN_TOKEN_ISSUER, ADMIN_TOKEN_TTL, AdminAuthError, AdminClaims, AdminScope, AdminTokens};
pub use embed::{EMBED_TOKEN_TTL, EmbedClaims, EmbedTokens, EmbedType};
pub use envelope::{Claims, Envelope, Minted, TokenSigner};
pub use error::{TokenError, VerifyFailure};
