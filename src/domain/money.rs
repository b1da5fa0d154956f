use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// An amount of the pegged value unit, counted in its smallest denomination.
///
/// Balances, prices and payouts are all whole numbers of units; fractional
/// arithmetic only happens inside [`Share::of`], which truncates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Units(u64);

impl Units {
    pub const ZERO: Self = Self(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Rejects zero, for operations whose contract requires `amount > 0`.
    pub fn positive(self) -> Result<Self> {
        if self.0 > 0 {
            Ok(self)
        } else {
            Err(MarketError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl From<u64> for Units {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Units {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Units {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// A revenue fraction in `[0, 1]`, e.g. `0.80` for an 80% seller share.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Share(Decimal);

impl Share {
    pub fn new(value: Decimal) -> Result<Self> {
        if value >= Decimal::ZERO && value <= Decimal::ONE {
            Ok(Self(value))
        } else {
            Err(MarketError::ValidationError(format!(
                "Share must be between 0 and 1, got {}",
                value
            )))
        }
    }

    /// Whole percentages, capped at 100.
    pub fn percent(percent: u8) -> Self {
        Self(Decimal::new(i64::from(percent.min(100)), 2))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// This share of `amount`, truncated towards zero.
    pub fn of(&self, amount: Units) -> Units {
        let portion = (Decimal::from(amount.0) * self.0).trunc();
        // A fraction in [0, 1] of a u64 always fits back into a u64.
        Units(portion.to_u64().unwrap_or(0))
    }
}

impl TryFrom<Decimal> for Share {
    type Error = MarketError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Share> for Decimal {
    fn from(share: Share) -> Self {
        share.0
    }
}

/// How one payment is divided between seller, bot creator and platform.
///
/// Seller and creator shares are truncated; the platform keeps whatever is
/// left, so the three parts always add up to the original payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSplit {
    pub seller: Units,
    pub creator: Units,
    pub platform: Units,
}

impl RevenueSplit {
    pub fn compute(total: Units, seller_share: Share, creator_share: Share) -> Result<Self> {
        if seller_share.value() + creator_share.value() > Decimal::ONE {
            return Err(MarketError::ValidationError(
                "Seller and creator shares exceed the whole payment".to_string(),
            ));
        }
        let seller = seller_share.of(total);
        let creator = creator_share.of(total);
        let platform = total
            .checked_sub(seller)
            .and_then(|rest| rest.checked_sub(creator))
            .ok_or_else(|| {
                MarketError::ValidationError("Revenue split exceeds payment".to_string())
            })?;
        let split = Self {
            seller,
            creator,
            platform,
        };
        debug_assert_eq!(split.total(), total);
        Ok(split)
    }

    pub fn total(&self) -> Units {
        self.seller + self.creator + self.platform
    }
}
