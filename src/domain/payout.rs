use crate::domain::bot::random_id;
use crate::domain::money::Units;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const NONCE_BYTES: usize = 10;

/// The random halves of an invoice number. A pair is never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivationNonces {
    pub derivation_prefix: String,
    pub derivation_suffix: String,
}

impl DerivationNonces {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut prefix = [0u8; NONCE_BYTES];
        let mut suffix = [0u8; NONCE_BYTES];
        rng.fill_bytes(&mut prefix);
        rng.fill_bytes(&mut suffix);
        Self {
            derivation_prefix: hex::encode(prefix),
            derivation_suffix: hex::encode(suffix),
        }
    }

    pub fn invoice_number(&self, protocol: &str) -> String {
        format!(
            "{}-{} {}",
            protocol, self.derivation_prefix, self.derivation_suffix
        )
    }
}

/// One output of an external payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutput {
    pub destination: String,
    pub amount: Units,
}

/// A cash-out that has left the resting balance but has not yet been
/// confirmed by its recipient.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    #[serde(rename = "paymentID")]
    pub payment_id: String,
    pub recipient: String,
    pub amount: Units,
    #[serde(flatten)]
    pub nonces: DerivationNonces,
    pub constructed_payment: Value,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingTransaction {
    pub fn new(
        recipient: impl Into<String>,
        amount: Units,
        nonces: DerivationNonces,
        constructed_payment: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            payment_id: random_id(),
            recipient: recipient.into(),
            amount,
            nonces,
            constructed_payment,
            acknowledged: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn acknowledge(&mut self, at: DateTime<Utc>) {
        self.acknowledged = true;
        self.updated_at = at;
    }
}

/// Outcome of trying to record a new payout.
#[derive(Debug, Clone, PartialEq)]
pub enum PayoutRecord {
    /// The payout was stored and the recipient debited.
    Recorded(PendingTransaction),
    /// Another payout was already outstanding; nothing changed.
    Existing(PendingTransaction),
}

impl PayoutRecord {
    pub fn into_transaction(self) -> PendingTransaction {
        match self {
            PayoutRecord::Recorded(tx) | PayoutRecord::Existing(tx) => tx,
        }
    }
}
