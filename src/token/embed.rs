//! Short-lived tokens for premium embed content (AGGR, liquidation tracker).

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use utoipa::ToSchema;

use super::envelope::{Claims, Envelope, Minted, TokenSigner};
use super::error::{TokenError, VerifyFailure};

/// Embed tokens cover one content load, not a session.
pub const EMBED_TOKEN_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EmbedType {
    Aggr,
    Liquidation,
}

impl EmbedType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aggr => "aggr",
            Self::Liquidation => "liquidation",
        }
    }
}

impl fmt::Display for EmbedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbedType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "aggr" => Ok(Self::Aggr),
            "liquidation" => Ok(Self::Liquidation),
            other => Err(format!("unknown embed type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedClaims {
    pub user_id: i64,
    pub email: String,
    #[serde(rename = "type")]
    pub embed_type: EmbedType,
}

impl Claims for EmbedClaims {
    const WITH_NONCE: bool = true;

    fn validate(&self) -> Result<(), VerifyFailure> {
        if self.user_id <= 0 || self.email.trim().is_empty() {
            return Err(VerifyFailure::InvalidPayload);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EmbedTokens {
    signer: TokenSigner,
}

impl EmbedTokens {
    #[must_use]
    pub fn new(signer: TokenSigner) -> Self {
        Self { signer }
    }

    /// # Errors
    /// Returns an error if the payload cannot be encoded.
    pub fn issue(
        &self,
        user_id: i64,
        email: &str,
        embed_type: EmbedType,
    ) -> Result<Minted<EmbedClaims>, TokenError> {
        let claims = EmbedClaims {
            user_id,
            email: email.to_string(),
            embed_type,
        };
        self.signer.mint(claims, EMBED_TOKEN_TTL)
    }

    /// # Errors
    /// Returns the verification failure reason.
    pub fn verify(&self, token: &str) -> Result<Envelope<EmbedClaims>, VerifyFailure> {
        self.signer.verify(token)
    }

    #[must_use]
    pub fn remaining_seconds(&self, envelope: &Envelope<EmbedClaims>) -> u64 {
        envelope.remaining_seconds(self.signer.now_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use anyhow::Result;
    use secrecy::SecretString;
    use serde_json::json;
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000_000;

    fn tokens() -> Result<(EmbedTokens, Arc<ManualClock>)> {
        let clock = Arc::new(ManualClock::new(NOW));
        let signer = TokenSigner::new(&SecretString::from("embed-secret".to_string()), clock.clone())?;
        Ok((EmbedTokens::new(signer), clock))
    }

    #[test]
    fn token_is_valid_at_four_minutes_and_expired_at_six() -> Result<()> {
        let (tokens, clock) = tokens()?;
        let minted = tokens.issue(42, "trader@example.com", EmbedType::Aggr)?;

        clock.advance(Duration::from_secs(4 * 60));
        let envelope = tokens.verify(&minted.token)?;
        assert_eq!(envelope.claims.user_id, 42);
        assert_eq!(envelope.claims.embed_type, EmbedType::Aggr);
        assert_eq!(tokens.remaining_seconds(&envelope), 60);

        clock.advance(Duration::from_secs(2 * 60));
        assert_eq!(
            tokens.verify(&minted.token).map(|_| ()),
            Err(VerifyFailure::Expired)
        );
        Ok(())
    }

    #[test]
    fn payload_uses_wire_field_names() -> Result<()> {
        let (tokens, _clock) = tokens()?;
        let minted = tokens.issue(7, "a@example.com", EmbedType::Liquidation)?;
        let value = serde_json::to_value(&minted.envelope)?;
        assert_eq!(value["userId"], json!(7));
        assert_eq!(value["email"], json!("a@example.com"));
        assert_eq!(value["type"], json!("liquidation"));
        assert_eq!(value["issuedAt"], json!(NOW));
        assert_eq!(value["expiresAt"], json!(NOW + 300_000));
        assert!(value["nonce"].is_string());
        Ok(())
    }

    #[test]
    fn unknown_type_is_an_invalid_payload() -> Result<()> {
        let (tokens, _clock) = tokens()?;
        let token = tokens.signer.seal_json(&json!({
            "userId": 1,
            "email": "a@example.com",
            "type": "orderbook",
            "issuedAt": NOW,
            "expiresAt": NOW + 1_000,
            "nonce": "abcd",
        }));
        assert_eq!(
            tokens.verify(&token).map(|_| ()),
            Err(VerifyFailure::InvalidPayload)
        );
        Ok(())
    }

    #[test]
    fn zero_user_or_blank_email_is_an_invalid_payload() -> Result<()> {
        let (tokens, _clock) = tokens()?;
        for (user_id, email) in [(0, "a@example.com"), (5, "  ")] {
            let token = tokens.signer.seal_json(&json!({
                "userId": user_id,
                "email": email,
                "type": "aggr",
                "issuedAt": NOW,
                "expiresAt": NOW + 1_000,
                "nonce": "abcd",
            }));
            assert_eq!(
                tokens.verify(&token).map(|_| ()),
                Err(VerifyFailure::InvalidPayload)
            );
        }
        Ok(())
    }

    #[test]
    fn embed_type_parses_only_known_values() {
        assert_eq!("aggr".parse::<EmbedType>(), Ok(EmbedType::Aggr));
        assert_eq!("liquidation".parse::<EmbedType>(), Ok(EmbedType::Liquidation));
        assert!("AGGR".parse::<EmbedType>().is_err());
    }
}
