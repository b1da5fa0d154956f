use crate::domain::bot::random_id;
use crate::domain::money::Units;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An offer to sell a bot at a fixed price.
///
/// At most one unsold listing exists per bot. `sold` only ever flips from
/// false to true; delisting removes the row instead.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub listing_id: String,
    #[serde(rename = "botID")]
    pub bot_id: String,
    pub seller: String,
    pub ask_price: Units,
    pub sold: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn new(bot_id: impl Into<String>, seller: impl Into<String>, ask_price: Units) -> Self {
        let now = Utc::now();
        Self {
            listing_id: random_id(),
            bot_id: bot_id.into(),
            seller: seller.into(),
            ask_price,
            sold: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.sold
    }
}

/// An active listing joined with what a shopper needs to see.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ListingView {
    #[serde(rename = "botID")]
    pub bot_id: String,
    pub name: String,
    pub motto: String,
    pub seller: String,
    pub seller_name: String,
    pub ask_price: Units,
    pub created_at: DateTime<Utc>,
}

/// Credits applied when a listing settles, keyed by recipient identity key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Credits(Vec<(String, Units)>);

impl Credits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero amounts are dropped.
    pub fn push(&mut self, identity_key: impl Into<String>, amount: Units) {
        if !amount.is_zero() {
            self.0.push((identity_key.into(), amount));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Units)> {
        self.0.iter().map(|(key, amount)| (key.as_str(), *amount))
    }

    pub fn total(&self) -> Units {
        self.0.iter().map(|(_, amount)| *amount).sum()
    }
}

/// Everything that must change together when a bot is sold.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleSettlement {
    pub listing_id: String,
    pub bot_id: String,
    pub buyer: String,
    pub credits: Credits,
}
