//! Signed identity envelopes for paid actions.
//!
//! The marketplace authenticates a paid write by re-deriving the canonical
//! string from the `x-agent-identity-v1` envelope and checking the secp256k1
//! signature against the agent's registered public key.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const ENVELOPE_VERSION: &str = "v1";

pub const HEADER_ACTION_ID: &str = "x-agent-action-id";
pub const HEADER_IDENTITY: &str = "x-agent-identity-v1";
pub const HEADER_SIGNATURE: &str = "x-agent-signature";
pub const HEADER_PUBLIC_KEY: &str = "x-agent-public-key";
pub const HEADER_PAYMENT: &str = "x-payment";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),
}

/// Claims an agent makes about a single paid action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEnvelope {
    pub version: String,
    /// Fresh per attempt; distinct from any idempotency key.
    pub action_id: String,
    pub agent_id: String,
    pub target_id: String,
    pub bid_amount_cents: u64,
    pub issued_at: DateTime<Utc>,
}

impl ActionEnvelope {
    pub fn new(agent_id: &str, target_id: &str, bid_amount_cents: u64, issued_at: DateTime<Utc>) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_string(),
            action_id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            target_id: target_id.to_string(),
            bid_amount_cents,
            issued_at,
        }
    }

    /// Newline-joined fields in fixed order; this exact byte string is signed.
    pub fn canonical_string(&self) -> String {
        [
            self.version.as_str(),
            self.action_id.as_str(),
            self.agent_id.as_str(),
            self.target_id.as_str(),
            &self.bid_amount_cents.to_string(),
            &self.issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        ]
        .join("\n")
    }

    pub fn to_header_value(&self) -> Result<String, IdentityError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| IdentityError::MalformedEnvelope(e.to_string()))?;
        Ok(BASE64.encode(json))
    }

    pub fn from_header_value(value: &str) -> Result<Self, IdentityError> {
        let bytes = BASE64
            .decode(value.trim())
            .map_err(|e| IdentityError::MalformedEnvelope(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| IdentityError::MalformedEnvelope(e.to_string()))
    }
}

/// Ready-to-attach header set for one signed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub action_id: String,
    pub identity: String,
    pub signature: String,
    pub public_key: String,
}

impl SignedHeaders {
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            (HEADER_ACTION_ID, self.action_id.as_str()),
            (HEADER_IDENTITY, self.identity.as_str()),
            (HEADER_SIGNATURE, self.signature.as_str()),
            (HEADER_PUBLIC_KEY, self.public_key.as_str()),
        ]
    }
}

/// One-shot payment authorization answering a `402 Payment Required`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    pub action_id: String,
    pub agent_id: String,
    pub pay_to: String,
    pub amount_cents: u64,
    pub nonce: String,
    #[serde(default)]
    pub signature: String,
}

impl PaymentAuthorization {
    pub fn canonical_string(&self) -> String {
        [
            "x402",
            self.action_id.as_str(),
            self.agent_id.as_str(),
            self.pay_to.as_str(),
            &self.amount_cents.to_string(),
            self.nonce.as_str(),
        ]
        .join("\n")
    }
}

/// The agent's secp256k1 signing key.
#[derive(Clone)]
pub struct AgentKey {
    signing: SigningKey,
}

impl std::fmt::Debug for AgentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentKey")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

impl AgentKey {
    /// Parse a 32-byte hex secret, with or without a `0x` prefix.
    pub fn from_hex(secret: &str) -> Result<Self, IdentityError> {
        let trimmed = secret.trim().trim_start_matches("0x");
        let bytes = hex::decode(trimmed).map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        let signing = SigningKey::from_slice(&bytes).map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        Ok(Self { signing })
    }

    pub fn random() -> Self {
        Self {
            signing: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    /// SEC1 compressed public key, hex encoded.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing.verifying_key().to_sec1_bytes())
    }

    pub fn sign_hex(&self, message: &str) -> String {
        let sig: Signature = self.signing.sign(message.as_bytes());
        hex::encode(sig.to_bytes())
    }

    pub fn sign_envelope(&self, envelope: &ActionEnvelope) -> Result<SignedHeaders, IdentityError> {
        Ok(SignedHeaders {
            action_id: envelope.action_id.clone(),
            identity: envelope.to_header_value()?,
            signature: self.sign_hex(&envelope.canonical_string()),
            public_key: self.public_key_hex(),
        })
    }

    /// Sign and encode an `x-payment` header value.
    pub fn sign_payment(&self, mut auth: PaymentAuthorization) -> Result<String, IdentityError> {
        auth.signature = self.sign_hex(&auth.canonical_string());
        let json = serde_json::to_vec(&auth).map_err(|e| IdentityError::MalformedEnvelope(e.to_string()))?;
        Ok(BASE64.encode(json))
    }
}

/// Check a hex signature over `message` against a hex SEC1 public key.
pub fn verify_hex(public_key_hex: &str, message: &str, signature_hex: &str) -> Result<(), IdentityError> {
    let key_bytes = hex::decode(public_key_hex).map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
    let key = VerifyingKey::from_sec1_bytes(&key_bytes).map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
    let sig_bytes = hex::decode(signature_hex).map_err(|e| IdentityError::InvalidSignature(e.to_string()))?;
    let sig = Signature::from_slice(&sig_bytes).map_err(|e| IdentityError::InvalidSignature(e.to_string()))?;
    key.verify(message.as_bytes(), &sig)
        .map_err(|e| IdentityError::InvalidSignature(e.to_string()))
}

/// Verify a full header set as the marketplace would.
pub fn verify_headers(identity: &str, signature_hex: &str, public_key_hex: &str) -> Result<ActionEnvelope, IdentityError> {
    let envelope = ActionEnvelope::from_header_value(identity)?;
    verify_hex(public_key_hex, &envelope.canonical_string(), signature_hex)?;
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn envelope() -> ActionEnvelope {
        let mut env = ActionEnvelope::new(
            "agent-7",
            "q1",
            20,
            Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap(),
        );
        env.action_id = "act-1".into();
        env
    }

    #[test]
    fn test_canonical_string_layout() {
        assert_eq!(
            envelope().canonical_string(),
            "v1\nact-1\nagent-7\nq1\n20\n2026-10-18T12:00:00.000Z"
        );
    }

    #[test]
    fn test_sign_and_verify_headers() {
        let key = AgentKey::from_hex(SECRET).unwrap();
        let headers = key.sign_envelope(&envelope()).unwrap();
        assert_eq!(headers.signature.len(), 128);
        let env = verify_headers(&headers.identity, &headers.signature, &headers.public_key).unwrap();
        assert_eq!(env, envelope());
    }

    #[test]
    fn test_tampered_envelope_fails() {
        let key = AgentKey::from_hex(&format!("0x{SECRET}")).unwrap();
        let headers = key.sign_envelope(&envelope()).unwrap();
        let mut forged = envelope();
        forged.bid_amount_cents = 2000;
        let forged_identity = forged.to_header_value().unwrap();
        assert!(verify_headers(&forged_identity, &headers.signature, &headers.public_key).is_err());
    }

    #[test]
    fn test_action_ids_are_fresh() {
        let now = Utc::now();
        assert_ne!(
            ActionEnvelope::new("a", "q", 1, now).action_id,
            ActionEnvelope::new("a", "q", 1, now).action_id
        );
    }

    #[test]
    fn test_bad_key_rejected() {
        assert!(matches!(AgentKey::from_hex("zz"), Err(IdentityError::InvalidKey(_))));
        assert!(AgentKey::from_hex("00").is_err());
    }
}
