use crate::domain::money::Units;
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_DISPLAY_NAME_LEN: usize = 2;

/// A marketplace participant, keyed by the public identity key the
/// authentication layer has already verified.
///
/// `balance` is the resting balance. Accounts are never deleted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub identity_key: String,
    pub display_name: String,
    pub balance: Units,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(identity_key: impl Into<String>, display_name: impl Into<String>) -> Result<Self> {
        let identity_key = identity_key.into();
        let display_name = display_name.into();
        if identity_key.trim().is_empty() {
            return Err(MarketError::ValidationError(
                "Identity key must not be empty".to_string(),
            ));
        }
        if display_name.trim().chars().count() < MIN_DISPLAY_NAME_LEN {
            return Err(MarketError::ValidationError(
                "Enter your name to register!".to_string(),
            ));
        }
        Ok(Self {
            identity_key,
            display_name,
            balance: Units::ZERO,
            created_at: Utc::now(),
        })
    }

    /// Adds funds to the resting balance.
    pub fn credit(&mut self, amount: Units) -> Result<()> {
        self.balance = self.balance.checked_add(amount).ok_or_else(|| {
            MarketError::ValidationError(format!(
                "Crediting {} would overflow the balance of {}",
                amount, self.identity_key
            ))
        })?;
        Ok(())
    }

    /// Removes funds from the resting balance if sufficient.
    pub fn debit(&mut self, amount: Units) -> Result<()> {
        match self.balance.checked_sub(amount) {
            Some(rest) => {
                self.balance = rest;
                Ok(())
            }
            None => Err(MarketError::InsufficientBalance {
                available: self.balance,
                required: amount,
            }),
        }
    }
}

/// Resting and in-flight components of an account's balance, read together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub resting: Units,
    pub unacknowledged: Units,
}

impl BalanceView {
    /// What the account appears to hold until outstanding payouts are confirmed.
    pub fn effective(&self) -> Units {
        self.resting + self.unacknowledged
    }
}

/// The caller's own account as reported back to them.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub identity_key: String,
    pub display_name: String,
    /// Effective balance.
    pub balance: Units,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(account: Account, balances: BalanceView) -> Self {
        Self {
            identity_key: account.identity_key,
            display_name: account.display_name,
            balance: balances.effective(),
            created_at: account.created_at,
        }
    }
}
