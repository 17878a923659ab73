//! Identity envelopes and payment authorizations for paid writes.

use agora_core::identity::{ActionEnvelope, AgentKey, PaymentAuthorization, SignedHeaders};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{GatewayError, Result};

/// Body of a `402 Payment Required` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    pub amount_cents: u64,
    pub pay_to: String,
    pub nonce: String,
}

#[derive(Debug, Clone)]
pub struct Signer {
    key: AgentKey,
}

impl Signer {
    pub fn new(key: AgentKey) -> Self {
        Self { key }
    }

    pub fn from_hex(secret: &str) -> Result<Self> {
        Ok(Self::new(AgentKey::from_hex(secret)?))
    }

    pub fn public_key_hex(&self) -> String {
        self.key.public_key_hex()
    }

    /// New envelope and action id per call; a 402 retry reuses them.
    pub fn identity_headers(
        &self,
        agent_id: &str,
        target_id: &str,
        bid_amount_cents: u64,
        now: DateTime<Utc>,
    ) -> Result<SignedHeaders> {
        let envelope = ActionEnvelope::new(agent_id, target_id, bid_amount_cents, now);
        Ok(self.key.sign_envelope(&envelope)?)
    }

    /// Answer a payment challenge, refusing any amount above the caller's bid.
    pub fn payment_header(
        &self,
        challenge: &PaymentChallenge,
        action_id: &str,
        agent_id: &str,
        bid_amount_cents: u64,
    ) -> Result<String> {
        if challenge.amount_cents > bid_amount_cents {
            return Err(GatewayError::PaymentRejected(format!(
                "challenge asks {}c, bid is {}c",
                challenge.amount_cents, bid_amount_cents
            )));
        }
        let auth = PaymentAuthorization {
            action_id: action_id.to_string(),
            agent_id: agent_id.to_string(),
            pay_to: challenge.pay_to.clone(),
            amount_cents: challenge.amount_cents,
            nonce: challenge.nonce.clone(),
            signature: String::new(),
        };
        Ok(self.key.sign_payment(auth)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::identity::verify_headers;

    fn challenge(amount_cents: u64) -> PaymentChallenge {
        PaymentChallenge {
            amount_cents,
            pay_to: "0xfeed".into(),
            nonce: "n-1".into(),
        }
    }

    #[test]
    fn test_identity_headers_verify() {
        let signer = Signer::new(AgentKey::random());
        let headers = signer.identity_headers("agent-1", "q1", 20, Utc::now()).unwrap();
        let env = verify_headers(&headers.identity, &headers.signature, &headers.public_key).unwrap();
        assert_eq!(env.target_id, "q1");
        assert_eq!(env.bid_amount_cents, 20);
        assert_eq!(env.action_id, headers.action_id);
    }

    #[test]
    fn test_payment_over_bid_rejected() {
        let signer = Signer::new(AgentKey::random());
        assert!(signer.payment_header(&challenge(20), "a", "agent-1", 20).is_ok());
        assert!(matches!(
            signer.payment_header(&challenge(21), "a", "agent-1", 20),
            Err(GatewayError::PaymentRejected(_))
        ));
    }
}
