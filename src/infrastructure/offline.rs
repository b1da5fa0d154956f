//! Local stand-ins for the external services, so the marketplace can run
//! end to end without network access.
//!
//! None of these produce anything spendable: `DigestKeyDeriver` is a plain
//! hash, not a key-derivation scheme, and `UnsignedPaymentBuilder` only
//! describes the outputs it was asked to pay.

use crate::domain::bot::{ChatMessage, Role, random_id};
use crate::domain::payout::PaymentOutput;
use crate::domain::ports::{AiResponder, KeyDeriver, PaymentBuilder};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// Answers by echoing the latest user message.
#[derive(Debug, Default, Clone)]
pub struct OfflineResponder;

#[async_trait]
impl AiResponder for OfflineResponder {
    async fn respond(&self, messages: &[ChatMessage]) -> Result<String> {
        let last = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .ok_or_else(|| {
                MarketError::ValidationError("No user message to respond to".to_string())
            })?;
        Ok(format!("You said: {}", last.content))
    }
}

/// Hashes the derivation inputs into a compressed-key-shaped hex string.
#[derive(Debug, Default, Clone)]
pub struct DigestKeyDeriver;

#[async_trait]
impl KeyDeriver for DigestKeyDeriver {
    async fn derive_public_key(
        &self,
        platform_key: &str,
        recipient_key: &str,
        invoice_number: &str,
    ) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(platform_key.as_bytes());
        hasher.update([0u8]);
        hasher.update(recipient_key.as_bytes());
        hasher.update([0u8]);
        hasher.update(invoice_number.as_bytes());
        Ok(format!("02{}", hex::encode(hasher.finalize())))
    }
}

#[derive(Debug, Default, Clone)]
pub struct UnsignedPaymentBuilder;

#[async_trait]
impl PaymentBuilder for UnsignedPaymentBuilder {
    async fn build_payment(&self, outputs: &[PaymentOutput]) -> Result<Value> {
        if outputs.is_empty() {
            return Err(MarketError::CollaboratorError(
                "A payment needs at least one output".to_string(),
            ));
        }
        Ok(json!({
            "reference": random_id(),
            "signed": false,
            "outputs": outputs,
        }))
    }
}
