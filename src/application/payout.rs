use crate::config::MarketConfig;
use crate::domain::payout::{DerivationNonces, PaymentOutput, PayoutRecord, PendingTransaction};
use crate::domain::ports::{KeyDeriver, MarketStoreRef, PaymentBuilder};
use crate::error::{MarketError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Converts an account's resting balance into a single external payment.
///
/// Per recipient the flow is `NoPending -> Pending -> Settled`. A request
/// made while a payout is pending returns that payout again instead of
/// debiting twice. Requests for the same recipient are serialized in-process,
/// and the store's `record_payout` refuses a second unacknowledged record, so
/// concurrent requests resolve to one payout even across processes.
#[derive(Clone)]
pub struct PayoutCoordinator {
    store: MarketStoreRef,
    config: Arc<MarketConfig>,
    key_deriver: Arc<dyn KeyDeriver>,
    payment_builder: Arc<dyn PaymentBuilder>,
    recipient_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl PayoutCoordinator {
    pub fn new(
        store: MarketStoreRef,
        config: Arc<MarketConfig>,
        key_deriver: Arc<dyn KeyDeriver>,
        payment_builder: Arc<dyn PaymentBuilder>,
    ) -> Self {
        Self {
            store,
            config,
            key_deriver,
            payment_builder,
            recipient_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn recipient_lock(&self, identity_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.recipient_locks.lock().await;
        locks
            .entry(identity_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the recipient's entry once no other request holds it.
    async fn release_recipient_lock(&self, identity_key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.recipient_locks.lock().await;
        // one reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(identity_key);
        }
    }

    pub async fn request_payout(&self, identity_key: &str) -> Result<PendingTransaction> {
        let lock = self.recipient_lock(identity_key).await;
        let outcome = {
            let _serialized = lock.lock().await;
            self.request_payout_serialized(identity_key).await
        };
        self.release_recipient_lock(identity_key, lock).await;
        outcome
    }

    async fn request_payout_serialized(&self, identity_key: &str) -> Result<PendingTransaction> {
        if let Some(existing) = self.store.unacknowledged_payout(identity_key).await? {
            debug!(identity_key, payment_id = %existing.payment_id, "replaying pending payout");
            return Ok(existing);
        }

        let balances = self.store.balances(identity_key).await?.ok_or_else(|| {
            MarketError::NotFound(
                "Register a user account before taking this action!".to_string(),
            )
        })?;
        let amount = balances.resting;
        if amount < self.config.minimum_payout {
            return Err(MarketError::InsufficientBalance {
                available: amount,
                required: self.config.minimum_payout,
            });
        }

        let nonces = self.fresh_nonces().await?;
        let invoice_number = nonces.invoice_number(&self.config.invoice_protocol);
        let destination = self
            .key_deriver
            .derive_public_key(&self.config.platform_key, identity_key, &invoice_number)
            .await?;
        let payment = self
            .payment_builder
            .build_payment(&[PaymentOutput {
                destination,
                amount,
            }])
            .await?;

        let pending = PendingTransaction::new(identity_key, amount, nonces, payment);
        let record = self.store.record_payout(pending).await?;
        match &record {
            PayoutRecord::Recorded(tx) => {
                info!(identity_key, payment_id = %tx.payment_id, amount = %tx.amount, "created payout");
            }
            PayoutRecord::Existing(tx) => {
                debug!(identity_key, payment_id = %tx.payment_id, "payout raced, returning existing");
            }
        }
        Ok(record.into_transaction())
    }

    /// Draws nonce pairs until one has never been used.
    async fn fresh_nonces(&self) -> Result<DerivationNonces> {
        for _ in 0..self.config.max_nonce_attempts {
            let nonces = DerivationNonces::generate();
            if !self.store.nonces_in_use(&nonces).await? {
                return Ok(nonces);
            }
        }
        Err(MarketError::Conflict(
            "Could not draw unused derivation nonces".to_string(),
        ))
    }
}
