use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use sha2::Sha256;
use std::{fmt, fmt::Write as _, sync::Arc, time::Duration};

use super::error::{TokenError, VerifyFailure};
use crate::clock::{Clock, duration_ms};

type HmacSha256 = Hmac<Sha256>;

const NONCE_BYTES: usize = 16;

/// Application fields carried inside a token envelope.
pub trait Claims: Serialize + DeserializeOwned {
    /// Whether minted envelopes carry a random nonce (and verified ones must).
    const WITH_NONCE: bool = false;

    /// Semantic checks serde cannot express. Runs after signature and expiry.
    ///
    /// # Errors
    /// Returns `VerifyFailure::InvalidPayload` when a field is out of range.
    fn validate(&self) -> Result<(), VerifyFailure> {
        Ok(())
    }
}

/// Signed payload: caller claims plus the reserved temporal fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<C> {
    #[serde(flatten)]
    pub claims: C,
    pub issued_at: i64,
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl<C> Envelope<C> {
    #[must_use]
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        self.expires_at.saturating_sub(now_ms).max(0)
    }

    /// Whole seconds left before expiry, rounded down.
    #[must_use]
    pub fn remaining_seconds(&self, now_ms: i64) -> u64 {
        u64::try_from(self.remaining_ms(now_ms) / 1000).unwrap_or(0)
    }
}

/// A freshly minted token together with the envelope it encodes.
#[derive(Debug, Clone)]
pub struct Minted<C> {
    pub token: String,
    pub envelope: Envelope<C>,
}

/// Mints and verifies `payload.signature` tokens with a single HMAC key.
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Build a signer from the configured secret.
    ///
    /// # Errors
    /// Returns `TokenError::MissingSecret` if the secret is empty. There is no
    /// default secret to fall back to.
    pub fn new(secret: &SecretString, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        let secret = secret.expose_secret();
        if secret.trim().is_empty() {
            return Err(TokenError::MissingSecret);
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::Key)?;
        Ok(Self { mac, clock })
    }

    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Mint a token valid for `ttl` from now.
    ///
    /// # Errors
    /// Returns an error if `ttl` is zero or the payload cannot be serialized.
    pub fn mint<C: Claims>(&self, claims: C, ttl: Duration) -> Result<Minted<C>, TokenError> {
        if ttl.is_zero() {
            return Err(TokenError::InvalidTtl);
        }
        let issued_at = self.clock.now_ms();
        let envelope = Envelope {
            claims,
            issued_at,
            expires_at: issued_at.saturating_add(duration_ms(ttl)),
            nonce: C::WITH_NONCE.then(generate_nonce),
        };

        let payload = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&envelope)?);
        let signature = Base64UrlUnpadded::encode_string(&self.sign(&payload));

        Ok(Minted {
            token: format!("{payload}.{signature}"),
            envelope,
        })
    }

    /// Verify a token against the current time.
    ///
    /// # Errors
    /// Returns the first check that failed; see [`TokenSigner::verify_at`].
    pub fn verify<C: Claims>(&self, token: &str) -> Result<Envelope<C>, VerifyFailure> {
        self.verify_at(token, self.clock.now_ms())
    }

    /// Verify a token as of `now_ms`.
    ///
    /// Nothing in the payload is trusted until the signature matches.
    ///
    /// # Errors
    /// - `Malformed` if the token is not two base64url parts holding a JSON object,
    /// - `BadSignature` if the MAC does not match,
    /// - `Expired` if `now_ms >= expiresAt`,
    /// - `InvalidPayload` if required fields are missing or ill-typed.
    pub fn verify_at<C: Claims>(&self, token: &str, now_ms: i64) -> Result<Envelope<C>, VerifyFailure> {
        let (payload_b64, signature_b64) = split_token(token)?;
        self.check_signature(payload_b64, signature_b64)?;
        let payload = decode_payload(payload_b64)?;
        check_expiry(&payload, now_ms)?;
        parse_envelope(payload)
    }

    fn sign(&self, payload_b64: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload_b64.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn check_signature(&self, payload_b64: &str, signature_b64: &str) -> Result<(), VerifyFailure> {
        let signature =
            Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| VerifyFailure::BadSignature)?;
        let mut mac = self.mac.clone();
        mac.update(payload_b64.as_bytes());
        // Constant-time comparison.
        mac.verify_slice(&signature)
            .map_err(|_| VerifyFailure::BadSignature)
    }

    /// Sign an arbitrary payload segment, bypassing envelope construction.
    #[cfg(test)]
    pub(crate) fn seal_raw(&self, payload_b64: &str) -> String {
        let signature = Base64UrlUnpadded::encode_string(&self.sign(payload_b64));
        format!("{payload_b64}.{signature}")
    }

    #[cfg(test)]
    pub(crate) fn seal_json(&self, payload: &Value) -> String {
        let encoded = Base64UrlUnpadded::encode_string(payload.to_string().as_bytes());
        self.seal_raw(&encoded)
    }
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(NONCE_BYTES * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

fn split_token(token: &str) -> Result<(&str, &str), VerifyFailure> {
    let mut parts = token.trim().split('.');
    let payload = parts
        .next()
        .filter(|part| !part.is_empty())
        .ok_or(VerifyFailure::Malformed)?;
    let signature = parts
        .next()
        .filter(|part| !part.is_empty())
        .ok_or(VerifyFailure::Malformed)?;
    if parts.next().is_some() {
        return Err(VerifyFailure::Malformed);
    }
    Ok((payload, signature))
}

fn decode_payload(payload_b64: &str) -> Result<Map<String, Value>, VerifyFailure> {
    let bytes = Base64UrlUnpadded::decode_vec(payload_b64).map_err(|_| VerifyFailure::Malformed)?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(VerifyFailure::Malformed),
    }
}

fn check_expiry(payload: &Map<String, Value>, now_ms: i64) -> Result<(), VerifyFailure> {
    let expires_at = payload
        .get("expiresAt")
        .and_then(Value::as_i64)
        .ok_or(VerifyFailure::InvalidPayload)?;
    if now_ms >= expires_at {
        return Err(VerifyFailure::Expired);
    }
    Ok(())
}

fn parse_envelope<C: Claims>(payload: Map<String, Value>) -> Result<Envelope<C>, VerifyFailure> {
    let envelope: Envelope<C> =
        serde_json::from_value(Value::Object(payload)).map_err(|_| VerifyFailure::InvalidPayload)?;
    if C::WITH_NONCE && envelope.nonce.as_deref().map_or(true, str::is_empty) {
        return Err(VerifyFailure::InvalidPayload);
    }
    if envelope.issued_at > envelope.expires_at {
        return Err(VerifyFailure::InvalidPayload);
    }
    envelope.claims.validate()?;
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use anyhow::Result;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Probe {
        subject: String,
    }

    impl Claims for Probe {
        fn validate(&self) -> Result<(), VerifyFailure> {
            if self.subject.is_empty() {
                return Err(VerifyFailure::InvalidPayload);
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct NoncedProbe {
        subject: String,
    }

    impl Claims for NoncedProbe {
        const WITH_NONCE: bool = true;
    }

    fn signer_with(secret: &str) -> Result<(TokenSigner, Arc<ManualClock>)> {
        let clock = Arc::new(ManualClock::new(NOW));
        let signer = TokenSigner::new(&SecretString::from(secret.to_string()), clock.clone())?;
        Ok((signer, clock))
    }

    fn probe() -> Probe {
        Probe {
            subject: "alice".to_string(),
        }
    }

    #[test]
    fn round_trip_preserves_claims() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;
        let minted = signer.mint(probe(), Duration::from_secs(60))?;
        let verified: Envelope<Probe> = signer.verify(&minted.token)?;
        assert_eq!(verified.claims, probe());
        assert_eq!(verified.issued_at, NOW);
        assert_eq!(verified.expires_at, NOW + 60_000);
        assert_eq!(verified, minted.envelope);
        Ok(())
    }

    #[test]
    fn token_has_two_url_safe_parts() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;
        let minted = signer.mint(probe(), Duration::from_secs(60))?;
        let parts: Vec<&str> = minted.token.split('.').collect();
        assert_eq!(parts.len(), 2);
        assert!(!minted.token.contains('='));
        assert!(!minted.token.contains('+'));
        assert!(!minted.token.contains('/'));
        Ok(())
    }

    #[test]
    fn expiry_boundary_is_exclusive() -> Result<()> {
        let (signer, clock) = signer_with("secret-a")?;
        let minted = signer.mint(probe(), Duration::from_millis(100))?;

        clock.advance(Duration::from_millis(99));
        assert!(signer.verify::<Probe>(&minted.token).is_ok());

        clock.advance(Duration::from_millis(1));
        assert_eq!(
            signer.verify::<Probe>(&minted.token),
            Err(VerifyFailure::Expired)
        );

        clock.advance(Duration::from_millis(50));
        assert_eq!(
            signer.verify::<Probe>(&minted.token),
            Err(VerifyFailure::Expired)
        );
        Ok(())
    }

    #[test]
    fn flipping_any_signature_bit_is_rejected() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;
        let minted = signer.mint(probe(), Duration::from_secs(60))?;
        let (payload, signature) = minted
            .token
            .split_once('.')
            .ok_or_else(|| anyhow::anyhow!("token without separator"))?;
        let raw = Base64UrlUnpadded::decode_vec(signature).map_err(|e| anyhow::anyhow!("{e}"))?;

        for byte in 0..raw.len() {
            for bit in 0..8 {
                let mut flipped = raw.clone();
                flipped[byte] ^= 1 << bit;
                let token = format!("{payload}.{}", Base64UrlUnpadded::encode_string(&flipped));
                assert_eq!(
                    signer.verify::<Probe>(&token),
                    Err(VerifyFailure::BadSignature),
                    "byte {byte} bit {bit}"
                );
            }
        }
        Ok(())
    }

    #[test]
    fn garbage_signature_segment_is_a_signature_failure() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;
        let minted = signer.mint(probe(), Duration::from_secs(60))?;
        let (payload, _) = minted
            .token
            .split_once('.')
            .ok_or_else(|| anyhow::anyhow!("token without separator"))?;

        for signature in ["!!!!", "a", "not*base64"] {
            let token = format!("{payload}.{signature}");
            assert_eq!(
                signer.verify::<Probe>(&token),
                Err(VerifyFailure::BadSignature)
            );
        }
        Ok(())
    }

    #[test]
    fn tampered_payload_is_rejected() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;
        let minted = signer.mint(probe(), Duration::from_secs(60))?;
        let (_, signature) = minted
            .token
            .split_once('.')
            .ok_or_else(|| anyhow::anyhow!("token without separator"))?;

        let forged = json!({
            "subject": "mallory",
            "issuedAt": NOW,
            "expiresAt": NOW + 60_000,
        });
        let forged_payload = Base64UrlUnpadded::encode_string(forged.to_string().as_bytes());
        let token = format!("{forged_payload}.{signature}");

        assert_eq!(
            signer.verify::<Probe>(&token),
            Err(VerifyFailure::BadSignature)
        );
        Ok(())
    }

    #[test]
    fn wrong_secret_is_rejected() -> Result<()> {
        let (signer_a, _clock) = signer_with("secret-a")?;
        let (signer_b, _clock) = signer_with("secret-b")?;
        let minted = signer_a.mint(probe(), Duration::from_secs(60))?;
        assert_eq!(
            signer_b.verify::<Probe>(&minted.token),
            Err(VerifyFailure::BadSignature)
        );
        Ok(())
    }

    #[test]
    fn structural_errors_are_malformed() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;
        for token in ["", "abc", ".sig", "payload.", "a.b.c", "..", " "] {
            assert_eq!(
                signer.verify::<Probe>(token),
                Err(VerifyFailure::Malformed),
                "token {token:?}"
            );
        }
        Ok(())
    }

    #[test]
    fn signed_but_undecodable_payload_is_malformed() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;

        let not_base64 = signer.seal_raw("not*base64");
        assert_eq!(
            signer.verify::<Probe>(&not_base64),
            Err(VerifyFailure::Malformed)
        );

        let not_json = signer.seal_raw(&Base64UrlUnpadded::encode_string(b"{not json"));
        assert_eq!(
            signer.verify::<Probe>(&not_json),
            Err(VerifyFailure::Malformed)
        );

        let not_object = signer.seal_json(&json!([1, 2, 3]));
        assert_eq!(
            signer.verify::<Probe>(&not_object),
            Err(VerifyFailure::Malformed)
        );
        Ok(())
    }

    #[test]
    fn expiry_is_checked_on_a_schema_valid_payload() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;
        let token = signer.seal_json(&json!({
            "subject": "alice",
            "issuedAt": NOW - 10_000,
            "expiresAt": NOW - 1,
        }));
        assert_eq!(signer.verify::<Probe>(&token), Err(VerifyFailure::Expired));
        Ok(())
    }

    #[test]
    fn schema_is_checked_on_an_unexpired_payload() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;

        let missing_field = signer.seal_json(&json!({
            "issuedAt": NOW,
            "expiresAt": NOW + 60_000,
        }));
        assert_eq!(
            signer.verify::<Probe>(&missing_field),
            Err(VerifyFailure::InvalidPayload)
        );

        let wrong_type = signer.seal_json(&json!({
            "subject": 42,
            "issuedAt": NOW,
            "expiresAt": NOW + 60_000,
        }));
        assert_eq!(
            signer.verify::<Probe>(&wrong_type),
            Err(VerifyFailure::InvalidPayload)
        );

        let empty_subject = signer.seal_json(&json!({
            "subject": "",
            "issuedAt": NOW,
            "expiresAt": NOW + 60_000,
        }));
        assert_eq!(
            signer.verify::<Probe>(&empty_subject),
            Err(VerifyFailure::InvalidPayload)
        );

        let missing_expiry = signer.seal_json(&json!({
            "subject": "alice",
            "issuedAt": NOW,
        }));
        assert_eq!(
            signer.verify::<Probe>(&missing_expiry),
            Err(VerifyFailure::InvalidPayload)
        );
        Ok(())
    }

    #[test]
    fn nonce_is_required_when_claims_ask_for_it() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;
        let token = signer.seal_json(&json!({
            "subject": "alice",
            "issuedAt": NOW,
            "expiresAt": NOW + 60_000,
        }));
        assert_eq!(
            signer.verify::<NoncedProbe>(&token).map(|e| e.claims.subject),
            Err(VerifyFailure::InvalidPayload)
        );
        Ok(())
    }

    #[test]
    fn repeated_mints_differ_by_nonce() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;
        let claims = NoncedProbe {
            subject: "alice".to_string(),
        };
        let first = signer.mint(claims.clone(), Duration::from_secs(60))?;
        let second = signer.mint(claims, Duration::from_secs(60))?;

        assert_ne!(first.token, second.token);
        let nonce = first.envelope.nonce.unwrap_or_default();
        assert_eq!(nonce.len(), NONCE_BYTES * 2);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
        Ok(())
    }

    #[test]
    fn claims_without_nonce_serialize_without_one() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;
        let minted = signer.mint(probe(), Duration::from_secs(60))?;
        assert!(minted.envelope.nonce.is_none());
        Ok(())
    }

    #[test]
    fn empty_secret_is_a_configuration_error() {
        let clock = Arc::new(ManualClock::new(NOW));
        for secret in ["", "   "] {
            let result = TokenSigner::new(&SecretString::from(secret.to_string()), clock.clone());
            assert!(matches!(result, Err(TokenError::MissingSecret)));
        }
    }

    #[test]
    fn zero_ttl_is_rejected() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;
        let result = signer.mint(probe(), Duration::ZERO);
        assert!(matches!(result, Err(TokenError::InvalidTtl)));
        Ok(())
    }

    #[test]
    fn remaining_seconds_rounds_down_and_floors_at_zero() -> Result<()> {
        let (signer, _clock) = signer_with("secret-a")?;
        let minted = signer.mint(probe(), Duration::from_millis(2_999))?;
        assert_eq!(minted.envelope.remaining_seconds(NOW), 2);
        assert_eq!(minted.envelope.remaining_seconds(NOW + 10_000), 0);
        Ok(())
    }

    #[test]
    fn debug_output_does_not_include_key_material() -> Result<()> {
        let (signer, _clock) = signer_with("super-secret-value")?;
        let debug = format!("{signer:?}");
        assert!(!debug.contains("super-secret-value"));
        Ok(())
    }
}
