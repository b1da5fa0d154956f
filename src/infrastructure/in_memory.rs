use crate::domain::account::{Account, BalanceView};
use crate::domain::bot::Bot;
use crate::domain::conversation::{Conversation, ConversationMessage};
use crate::domain::listing::{Credits, Listing, SaleSettlement};
use crate::domain::money::Units;
use crate::domain::payout::{DerivationNonces, PayoutRecord, PendingTransaction};
use crate::domain::ports::MarketStore;
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    bots: HashMap<String, Bot>,
    /// Keyed by listing id.
    listings: HashMap<String, Listing>,
    /// Keyed by payment id.
    payouts: HashMap<String, PendingTransaction>,
    conversations: HashMap<String, Conversation>,
    /// Keyed by conversation id, in append order.
    messages: HashMap<String, Vec<ConversationMessage>>,
}

impl Tables {
    fn account_mut(&mut self, identity_key: &str) -> Result<&mut Account> {
        self.accounts
            .get_mut(identity_key)
            .ok_or_else(|| MarketError::NotFound(format!("account {}", identity_key)))
    }

    fn active_listing(&self, bot_id: &str) -> Option<&Listing> {
        self.listings
            .values()
            .find(|listing| listing.bot_id == bot_id && listing.is_active())
    }

    fn unacknowledged(&self, recipient: &str) -> Option<&PendingTransaction> {
        self.payouts
            .values()
            .find(|tx| tx.recipient == recipient && !tx.acknowledged)
    }

    /// Applies every credit or none of them.
    fn apply_credits(&mut self, credits: &Credits) -> Result<()> {
        let mut staged: HashMap<&str, Units> = HashMap::new();
        for (key, amount) in credits.iter() {
            let current = match staged.get(key) {
                Some(balance) => *balance,
                None => {
                    self.accounts
                        .get(key)
                        .ok_or_else(|| MarketError::NotFound(format!("account {}", key)))?
                        .balance
                }
            };
            let next = current.checked_add(amount).ok_or_else(|| {
                MarketError::ValidationError(format!("Crediting {} would overflow", key))
            })?;
            staged.insert(key, next);
        }
        for (key, balance) in staged {
            self.account_mut(key)?.balance = balance;
        }
        Ok(())
    }
}

/// A thread-safe in-memory marketplace store.
///
/// All tables sit behind one `RwLock`, so every write method runs as a single
/// critical section. Ideal for tests and single-process deployments where
/// persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryMarketStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryMarketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarketStore for InMemoryMarketStore {
    async fn insert_account(&self, account: Account) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.accounts.contains_key(&account.identity_key) {
            return Err(MarketError::Conflict(format!(
                "account {} is already registered",
                account.identity_key
            )));
        }
        tables.accounts.insert(account.identity_key.clone(), account);
        Ok(())
    }

    async fn account(&self, identity_key: &str) -> Result<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.get(identity_key).cloned())
    }

    async fn credit(&self, identity_key: &str, amount: Units) -> Result<Units> {
        let mut tables = self.tables.write().await;
        let account = tables.account_mut(identity_key)?;
        account.credit(amount)?;
        Ok(account.balance)
    }

    async fn debit(&self, identity_key: &str, amount: Units) -> Result<Units> {
        let mut tables = self.tables.write().await;
        let account = tables.account_mut(identity_key)?;
        account.debit(amount)?;
        Ok(account.balance)
    }

    async fn balances(&self, identity_key: &str) -> Result<Option<BalanceView>> {
        let tables = self.tables.read().await;
        let Some(account) = tables.accounts.get(identity_key) else {
            return Ok(None);
        };
        let unacknowledged = tables
            .payouts
            .values()
            .filter(|tx| tx.recipient == identity_key && !tx.acknowledged)
            .map(|tx| tx.amount)
            .sum();
        Ok(Some(BalanceView {
            resting: account.balance,
            unacknowledged,
        }))
    }

    async fn insert_bot(&self, bot: Bot) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.bots.contains_key(&bot.id) {
            return Err(MarketError::Conflict(format!("bot {} already exists", bot.id)));
        }
        tables.bots.insert(bot.id.clone(), bot);
        Ok(())
    }

    async fn bot(&self, bot_id: &str) -> Result<Option<Bot>> {
        let tables = self.tables.read().await;
        Ok(tables.bots.get(bot_id).cloned())
    }

    async fn bots_owned_by(&self, identity_key: &str) -> Result<Vec<Bot>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bots
            .values()
            .filter(|bot| bot.is_owned_by(identity_key))
            .cloned()
            .collect())
    }

    async fn delete_bot(&self, owner: &str, bot_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.active_listing(bot_id).is_some() {
            return Err(MarketError::Conflict(format!(
                "bot {} is listed on the marketplace",
                bot_id
            )));
        }
        let bot = tables
            .bots
            .get_mut(bot_id)
            .filter(|bot| !bot.deleted)
            .ok_or_else(|| MarketError::NotFound(format!("bot {}", bot_id)))?;
        if bot.owner_identity_key != owner {
            return Err(MarketError::Unauthorized(
                "You do not appear to own this bot!".to_string(),
            ));
        }
        bot.deleted = true;
        Ok(())
    }

    async fn insert_listing(&self, listing: Listing) -> Result<()> {
        let mut tables = self.tables.write().await;
        let bot = tables
            .bots
            .get(&listing.bot_id)
            .filter(|bot| !bot.deleted)
            .ok_or_else(|| MarketError::NotFound(format!("bot {}", listing.bot_id)))?;
        if bot.owner_identity_key != listing.seller {
            return Err(MarketError::Unauthorized(
                "You do not appear to own this bot!".to_string(),
            ));
        }
        if tables.active_listing(&listing.bot_id).is_some() {
            return Err(MarketError::Conflict(
                "This bot is already on the marketplace!".to_string(),
            ));
        }
        tables.listings.insert(listing.listing_id.clone(), listing);
        Ok(())
    }

    async fn active_listing(&self, bot_id: &str) -> Result<Option<Listing>> {
        let tables = self.tables.read().await;
        Ok(tables.active_listing(bot_id).cloned())
    }

    async fn active_listings(&self) -> Result<Vec<Listing>> {
        let tables = self.tables.read().await;
        let mut listings: Vec<Listing> = tables
            .listings
            .values()
            .filter(|listing| listing.is_active())
            .cloned()
            .collect();
        listings.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(listings)
    }

    async fn remove_listing(&self, seller: &str, bot_id: &str) -> Result<Listing> {
        let mut tables = self.tables.write().await;
        let listing = tables
            .active_listing(bot_id)
            .ok_or_else(|| MarketError::NotFound(format!("no active listing for bot {}", bot_id)))?;
        if listing.seller != seller {
            return Err(MarketError::Unauthorized(
                "You did not list this bot".to_string(),
            ));
        }
        let listing_id = listing.listing_id.clone();
        tables
            .listings
            .remove(&listing_id)
            .ok_or_else(|| MarketError::NotFound(format!("listing {}", listing_id)))
    }

    async fn settle_sale(&self, settlement: SaleSettlement) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let still_active = tables
            .listings
            .get(&settlement.listing_id)
            .is_some_and(|listing| listing.is_active() && listing.bot_id == settlement.bot_id);
        if !still_active {
            return Ok(false);
        }
        if !tables.bots.contains_key(&settlement.bot_id) {
            return Err(MarketError::NotFound(format!("bot {}", settlement.bot_id)));
        }

        tables.apply_credits(&settlement.credits)?;
        let now = Utc::now();
        if let Some(listing) = tables.listings.get_mut(&settlement.listing_id) {
            listing.sold = true;
            listing.updated_at = now;
        }
        if let Some(bot) = tables.bots.get_mut(&settlement.bot_id) {
            bot.owner_identity_key = settlement.buyer;
        }
        Ok(true)
    }

    async fn settle_trial(&self, listing_id: &str, credits: Credits) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let still_active = tables
            .listings
            .get(listing_id)
            .is_some_and(Listing::is_active);
        if !still_active {
            return Ok(false);
        }
        tables.apply_credits(&credits)?;
        Ok(true)
    }

    async fn unacknowledged_payout(
        &self,
        recipient: &str,
    ) -> Result<Option<PendingTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables.unacknowledged(recipient).cloned())
    }

    async fn nonces_in_use(&self, nonces: &DerivationNonces) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables.payouts.values().any(|tx| &tx.nonces == nonces))
    }

    async fn record_payout(&self, payout: PendingTransaction) -> Result<PayoutRecord> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.unacknowledged(&payout.recipient) {
            return Ok(PayoutRecord::Existing(existing.clone()));
        }
        if tables.payouts.values().any(|tx| tx.nonces == payout.nonces) {
            return Err(MarketError::Conflict(
                "derivation nonces have already been used".to_string(),
            ));
        }
        if tables.payouts.contains_key(&payout.payment_id) {
            return Err(MarketError::Conflict(format!(
                "payment {} already exists",
                payout.payment_id
            )));
        }
        tables.account_mut(&payout.recipient)?.debit(payout.amount)?;
        tables
            .payouts
            .insert(payout.payment_id.clone(), payout.clone());
        Ok(PayoutRecord::Recorded(payout))
    }

    async fn acknowledge_payout(
        &self,
        recipient: &str,
        payment_id: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingTransaction> {
        let mut tables = self.tables.write().await;
        let payout = tables
            .payouts
            .get_mut(payment_id)
            .filter(|tx| tx.recipient == recipient)
            .ok_or_else(|| MarketError::NotFound("Payment not found!".to_string()))?;
        if payout.acknowledged {
            return Err(MarketError::AlreadyAcknowledged(payment_id.to_string()));
        }
        payout.acknowledge(at);
        Ok(payout.clone())
    }

    async fn payouts_for(&self, recipient: &str) -> Result<Vec<PendingTransaction>> {
        let tables = self.tables.read().await;
        let mut payouts: Vec<PendingTransaction> = tables
            .payouts
            .values()
            .filter(|tx| tx.recipient == recipient)
            .cloned()
            .collect();
        payouts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(payouts)
    }

    async fn insert_conversation(
        &self,
        conversation: Conversation,
        messages: Vec<ConversationMessage>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.conversations.contains_key(&conversation.id) {
            return Err(MarketError::Conflict(format!(
                "conversation {} already exists",
                conversation.id
            )));
        }
        tables.messages.insert(conversation.id.clone(), messages);
        tables
            .conversations
            .insert(conversation.id.clone(), conversation);
        Ok(())
    }

    async fn conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let tables = self.tables.read().await;
        Ok(tables.conversations.get(conversation_id).cloned())
    }

    async fn conversations_for(&self, owner: &str, bot_id: &str) -> Result<Vec<Conversation>> {
        let tables = self.tables.read().await;
        let mut conversations: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|c| c.is_accessible(owner, bot_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(conversations)
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ConversationMessage>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: Vec<ConversationMessage>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.conversations.contains_key(conversation_id) {
            return Err(MarketError::NotFound(format!(
                "conversation {}",
                conversation_id
            )));
        }
        tables
            .messages
            .entry(conversation_id.to_string())
            .or_default()
            .extend(messages);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bot::{ChatMessage, Role};
    use serde_json::json;

    async fn store_with(accounts: &[(&str, u64)]) -> InMemoryMarketStore {
        let store = InMemoryMarketStore::new();
        for (key, balance) in accounts {
            let mut account = Account::new(*key, "Tester").unwrap();
            account.balance = Units::new(*balance);
            store.insert_account(account).await.unwrap();
        }
        store
    }

    fn payout(recipient: &str, amount: u64) -> PendingTransaction {
        PendingTransaction::new(
            recipient,
            Units::new(amount),
            DerivationNonces::generate(),
            json!({}),
        )
    }

    #[tokio::test]
    async fn test_duplicate_account_rejected() {
        let store = store_with(&[("alice", 0)]).await;
        let again = Account::new("alice", "Alice").unwrap();
        assert!(matches!(
            store.insert_account(again).await,
            Err(MarketError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_debit_never_overdraws() {
        let store = store_with(&[("alice", 100)]).await;
        assert!(matches!(
            store.debit("alice", Units::new(101)).await,
            Err(MarketError::InsufficientBalance { .. })
        ));
        assert_eq!(store.debit("alice", Units::new(100)).await.unwrap(), Units::ZERO);
    }

    #[tokio::test]
    async fn test_credits_are_all_or_nothing() {
        let store = store_with(&[("seller", 0)]).await;
        let mut bot = Bot::new("seller", "Helper", "", vec![]).unwrap();
        bot.id = "bot".to_string();
        store.insert_bot(bot).await.unwrap();
        let listing = Listing::new("bot", "seller", Units::new(1000));
        let listing_id = listing.listing_id.clone();
        store.insert_listing(listing).await.unwrap();

        let mut credits = Credits::new();
        credits.push("seller", Units::new(500));
        credits.push("ghost", Units::new(50));
        let result = store.settle_trial(&listing_id, credits).await;

        assert!(matches!(result, Err(MarketError::NotFound(_))));
        let seller = store.account("seller").await.unwrap().unwrap();
        assert_eq!(seller.balance, Units::ZERO);
    }

    #[tokio::test]
    async fn test_settle_sale_only_once() {
        let store = store_with(&[("seller", 0), ("buyer", 0)]).await;
        let mut bot = Bot::new("seller", "Helper", "", vec![]).unwrap();
        bot.id = "bot".to_string();
        store.insert_bot(bot).await.unwrap();
        let listing = Listing::new("bot", "seller", Units::new(1000));
        let listing_id = listing.listing_id.clone();
        store.insert_listing(listing).await.unwrap();

        let mut credits = Credits::new();
        credits.push("seller", Units::new(850));
        let settlement = SaleSettlement {
            listing_id,
            bot_id: "bot".to_string(),
            buyer: "buyer".to_string(),
            credits,
        };

        assert!(store.settle_sale(settlement.clone()).await.unwrap());
        assert!(!store.settle_sale(settlement).await.unwrap());

        let seller = store.account("seller").await.unwrap().unwrap();
        assert_eq!(seller.balance, Units::new(850));
        let bot = store.bot("bot").await.unwrap().unwrap();
        assert_eq!(bot.owner_identity_key, "buyer");
        assert!(store.active_listing("bot").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_payout_debits_and_replays() {
        let store = store_with(&[("alice", 1500)]).await;
        let first = store.record_payout(payout("alice", 1500)).await.unwrap();
        let PayoutRecord::Recorded(first) = first else {
            panic!("expected a new payout");
        };

        let second = store.record_payout(payout("alice", 1500)).await.unwrap();
        assert_eq!(second, PayoutRecord::Existing(first.clone()));

        let balances = store.balances("alice").await.unwrap().unwrap();
        assert_eq!(balances.resting, Units::ZERO);
        assert_eq!(balances.unacknowledged, Units::new(1500));
    }

    #[tokio::test]
    async fn test_record_payout_without_funds_leaves_no_record() {
        let store = store_with(&[("alice", 10)]).await;
        let result = store.record_payout(payout("alice", 1500)).await;
        assert!(matches!(
            result,
            Err(MarketError::InsufficientBalance { .. })
        ));
        assert!(store.unacknowledged_payout("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reused_nonces_rejected() {
        let store = store_with(&[("alice", 2000), ("bob", 2000)]).await;
        let first = payout("alice", 1000);
        let mut second = payout("bob", 1000);
        second.nonces = first.nonces.clone();
        store.record_payout(first).await.unwrap();

        assert!(store.nonces_in_use(&second.nonces).await.unwrap());
        assert!(matches!(
            store.record_payout(second).await,
            Err(MarketError::Conflict(_))
        ));
        let bob = store.account("bob").await.unwrap().unwrap();
        assert_eq!(bob.balance, Units::new(2000));
    }

    #[tokio::test]
    async fn test_conversation_messages_keep_order() {
        let store = store_with(&[("alice", 0)]).await;
        let conversation = Conversation::new("alice", "bot", "Trial");
        let id = conversation.id.clone();
        store
            .insert_conversation(
                conversation,
                vec![ConversationMessage::new(&id, ChatMessage::user("one"))],
            )
            .await
            .unwrap();
        store
            .append_messages(
                &id,
                vec![
                    ConversationMessage::new(&id, ChatMessage::user("two")),
                    ConversationMessage::new(&id, ChatMessage::new(Role::Assistant, "three")),
                ],
            )
            .await
            .unwrap();

        let contents: Vec<String> = store
            .conversation_messages(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["one", "two", "three"]);
        assert_eq!(store.conversations_for("alice", "bot").await.unwrap().len(), 1);
        assert!(store.conversations_for("alice", "other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_to_unknown_conversation() {
        let store = InMemoryMarketStore::new();
        let result = store
            .append_messages("missing", vec![ConversationMessage::new("missing", ChatMessage::user("hi"))])
            .await;
        assert!(matches!(result, Err(MarketError::NotFound(_))));
    }
}
