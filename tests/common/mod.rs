#![allow(dead_code)]

use async_trait::async_trait;
use botbazaar::application::market::Marketplace;
use botbazaar::config::MarketConfig;
use botbazaar::domain::bot::ChatMessage;
use botbazaar::domain::money::Units;
use botbazaar::domain::ports::{AiResponder, Collaborators, MarketStoreRef};
use botbazaar::error::{MarketError, Result};
use botbazaar::infrastructure::in_memory::InMemoryMarketStore;
use botbazaar::infrastructure::offline::{
    DigestKeyDeriver, OfflineResponder, UnsignedPaymentBuilder,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const PLATFORM: &str = "platform";

pub fn config() -> MarketConfig {
    MarketConfig {
        platform_account: Some(PLATFORM.to_string()),
        ..MarketConfig::default().with_platform_key("test-platform-key")
    }
}

pub fn collaborators() -> Collaborators {
    Collaborators {
        responder: Arc::new(OfflineResponder),
        key_deriver: Arc::new(DigestKeyDeriver),
        payment_builder: Arc::new(UnsignedPaymentBuilder),
    }
}

pub async fn market() -> Marketplace {
    market_on(Arc::new(InMemoryMarketStore::new())).await
}

pub async fn market_on(store: MarketStoreRef) -> Marketplace {
    Marketplace::open(store, config(), collaborators())
        .await
        .unwrap()
}

/// Registers `creator` and `seller`, has the creator build a bot, hands it to
/// the seller through a sale when they differ, and lists it at `ask_price`.
/// Returns the bot id.
pub async fn listed_bot(market: &Marketplace, creator: &str, ask_price: u64) -> String {
    register(market, creator).await;
    let bot = market
        .escrow
        .create_bot(creator, "Helper", "Always helpful", vec![ChatMessage::user("hi")])
        .await
        .unwrap();
    market
        .escrow
        .list(creator, &bot.id, Units::new(ask_price))
        .await
        .unwrap();
    bot.id
}

pub async fn register(market: &Marketplace, identity_key: &str) {
    market
        .ledger
        .ensure_account(identity_key, &format!("User {}", identity_key))
        .await
        .unwrap();
}

/// Sum of every resting balance plus every pending payout.
pub async fn ledger_total(market: &Marketplace, keys: &[&str]) -> u64 {
    let mut total = 0;
    for key in keys {
        total += market.ledger.effective_balance(key).await.unwrap().value();
    }
    total
}

pub struct FailingResponder;

#[async_trait]
impl AiResponder for FailingResponder {
    async fn respond(&self, _messages: &[ChatMessage]) -> Result<String> {
        Err(MarketError::CollaboratorError(
            "responder unavailable".to_string(),
        ))
    }
}

pub fn write_requests(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}
