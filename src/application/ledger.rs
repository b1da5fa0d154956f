use crate::domain::account::{Account, BalanceView, Profile};
use crate::domain::money::Units;
use crate::domain::ports::MarketStoreRef;
use crate::error::{MarketError, Result};
use tracing::{debug, info};

/// Per-account balance accounting.
///
/// Every balance change goes through the store's atomic credit and debit
/// primitives; the ledger never reads a balance and writes back a computed one.
#[derive(Clone)]
pub struct AccountLedger {
    store: MarketStoreRef,
}

impl AccountLedger {
    pub fn new(store: MarketStoreRef) -> Self {
        Self { store }
    }

    pub async fn register(&self, identity_key: &str, display_name: &str) -> Result<Account> {
        let account = Account::new(identity_key, display_name)?;
        self.store.insert_account(account.clone()).await?;
        info!(identity_key, "registered account");
        Ok(account)
    }

    /// Registers the account unless it already exists.
    pub async fn ensure_account(&self, identity_key: &str, display_name: &str) -> Result<Account> {
        match self.store.account(identity_key).await? {
            Some(account) => Ok(account),
            None => self.register(identity_key, display_name).await,
        }
    }

    pub async fn account(&self, identity_key: &str) -> Result<Account> {
        self.store.account(identity_key).await?.ok_or_else(|| {
            MarketError::NotFound(
                "Register a user account before taking this action!".to_string(),
            )
        })
    }

    pub async fn credit(&self, identity_key: &str, amount: Units) -> Result<Units> {
        let amount = amount.positive()?;
        let balance = self.store.credit(identity_key, amount).await?;
        debug!(identity_key, %amount, %balance, "credited account");
        Ok(balance)
    }

    /// Fails with `InsufficientBalance` instead of overdrawing.
    pub async fn debit(&self, identity_key: &str, amount: Units) -> Result<Units> {
        let amount = amount.positive()?;
        let balance = self.store.debit(identity_key, amount).await?;
        debug!(identity_key, %amount, %balance, "debited account");
        Ok(balance)
    }

    pub async fn resting_balance(&self, identity_key: &str) -> Result<Units> {
        Ok(self.balances(identity_key).await?.resting)
    }

    /// Resting balance plus every payout the account has not yet acknowledged.
    pub async fn effective_balance(&self, identity_key: &str) -> Result<Units> {
        Ok(self.balances(identity_key).await?.effective())
    }

    pub async fn balances(&self, identity_key: &str) -> Result<BalanceView> {
        self.store.balances(identity_key).await?.ok_or_else(|| {
            MarketError::NotFound(
                "Register a user account before taking this action!".to_string(),
            )
        })
    }

    pub async fn profile(&self, identity_key: &str) -> Result<Profile> {
        let account = self.account(identity_key).await?;
        let balances = self.balances(identity_key).await?;
        Ok(Profile::new(account, balances))
    }
}
