use crate::domain::payout::PendingTransaction;
use crate::domain::ports::MarketStoreRef;
use crate::error::{MarketError, Result};
use chrono::Utc;
use tracing::info;

/// Closes out a payout once its recipient confirms receipt.
///
/// The money left the resting balance when the payout was requested; this
/// only removes it from the unacknowledged part of the effective balance.
#[derive(Clone)]
pub struct TransactionAcknowledgment {
    store: MarketStoreRef,
}

impl TransactionAcknowledgment {
    pub fn new(store: MarketStoreRef) -> Self {
        Self { store }
    }

    pub async fn acknowledge(
        &self,
        identity_key: &str,
        payment_id: &str,
    ) -> Result<PendingTransaction> {
        self.require_account(identity_key).await?;
        let tx = self
            .store
            .acknowledge_payout(identity_key, payment_id, Utc::now())
            .await?;
        info!(identity_key, payment_id, amount = %tx.amount, "payout acknowledged");
        Ok(tx)
    }

    /// Every payout ever made to the account, oldest first.
    pub async fn history(&self, identity_key: &str) -> Result<Vec<PendingTransaction>> {
        self.require_account(identity_key).await?;
        self.store.payouts_for(identity_key).await
    }

    async fn require_account(&self, identity_key: &str) -> Result<()> {
        match self.store.account(identity_key).await? {
            Some(_) => Ok(()),
            None => Err(MarketError::NotFound(
                "Register a user account before taking this action!".to_string(),
            )),
        }
    }
}
