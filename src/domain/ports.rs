use super::account::{Account, BalanceView};
use super::bot::{Bot, ChatMessage};
use super::conversation::{Conversation, ConversationMessage};
use super::listing::{Credits, Listing, SaleSettlement};
use super::money::Units;
use super::payout::{DerivationNonces, PaymentOutput, PayoutRecord, PendingTransaction};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Persistence for accounts, bots, listings and payouts.
///
/// Every method is a single atomic unit: an implementation either applies
/// all of a method's effects or none of them, and concurrent calls touching
/// the same rows behave as if serialized.
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Fails with `Conflict` if the identity key is already registered.
    async fn insert_account(&self, account: Account) -> Result<()>;
    async fn account(&self, identity_key: &str) -> Result<Option<Account>>;
    /// Returns the new resting balance.
    async fn credit(&self, identity_key: &str, amount: Units) -> Result<Units>;
    /// Checks and debits in one step. Returns the new resting balance.
    async fn debit(&self, identity_key: &str, amount: Units) -> Result<Units>;
    async fn balances(&self, identity_key: &str) -> Result<Option<BalanceView>>;

    async fn insert_bot(&self, bot: Bot) -> Result<()>;
    async fn bot(&self, bot_id: &str) -> Result<Option<Bot>>;
    async fn bots_owned_by(&self, identity_key: &str) -> Result<Vec<Bot>>;
    /// Soft-deletes a bot its owner has not listed.
    async fn delete_bot(&self, owner: &str, bot_id: &str) -> Result<()>;

    /// Stores a listing if the seller owns the bot and it has no active listing.
    async fn insert_listing(&self, listing: Listing) -> Result<()>;
    async fn active_listing(&self, bot_id: &str) -> Result<Option<Listing>>;
    async fn active_listings(&self) -> Result<Vec<Listing>>;
    /// Removes the seller's own active listing for `bot_id`.
    async fn remove_listing(&self, seller: &str, bot_id: &str) -> Result<Listing>;
    /// Flips the listing to sold, applies the credits and hands the bot to the
    /// buyer, only if the listing is still active. Returns whether it was.
    async fn settle_sale(&self, settlement: SaleSettlement) -> Result<bool>;
    /// Applies the credits only if the listing is still active. Returns whether it was.
    async fn settle_trial(&self, listing_id: &str, credits: Credits) -> Result<bool>;

    async fn unacknowledged_payout(&self, recipient: &str)
    -> Result<Option<PendingTransaction>>;
    async fn nonces_in_use(&self, nonces: &DerivationNonces) -> Result<bool>;
    /// Stores the payout and debits its amount from the recipient together.
    ///
    /// If the recipient already has an unacknowledged payout, that record is
    /// returned as [`PayoutRecord::Existing`] and nothing changes.
    async fn record_payout(&self, payout: PendingTransaction) -> Result<PayoutRecord>;
    async fn acknowledge_payout(
        &self,
        recipient: &str,
        payment_id: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingTransaction>;
    async fn payouts_for(&self, recipient: &str) -> Result<Vec<PendingTransaction>>;

    /// Stores a conversation together with its opening messages.
    async fn insert_conversation(
        &self,
        conversation: Conversation,
        messages: Vec<ConversationMessage>,
    ) -> Result<()>;
    async fn conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;
    async fn conversations_for(&self, owner: &str, bot_id: &str) -> Result<Vec<Conversation>>;
    /// Messages in the order they were appended.
    async fn conversation_messages(&self, conversation_id: &str)
    -> Result<Vec<ConversationMessage>>;
    /// Appends in order. Fails with `NotFound` for an unknown conversation.
    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: Vec<ConversationMessage>,
    ) -> Result<()>;
}

pub type MarketStoreRef = Arc<dyn MarketStore>;
pub type MarketStoreFactory = Box<dyn Fn() -> MarketStoreRef + Send + Sync>;

/// Produces a bot's reply to an ordered conversation.
#[async_trait]
pub trait AiResponder: Send + Sync {
    async fn respond(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Turns (platform key, recipient key, invoice number) into a one-time
/// public key that only the recipient can later spend from.
#[async_trait]
pub trait KeyDeriver: Send + Sync {
    async fn derive_public_key(
        &self,
        platform_key: &str,
        recipient_key: &str,
        invoice_number: &str,
    ) -> Result<String>;
}

/// Builds a signed external payment paying the given outputs.
#[async_trait]
pub trait PaymentBuilder: Send + Sync {
    async fn build_payment(&self, outputs: &[PaymentOutput]) -> Result<Value>;
}

/// External services the marketplace delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub responder: Arc<dyn AiResponder>,
    pub key_deriver: Arc<dyn KeyDeriver>,
    pub payment_builder: Arc<dyn PaymentBuilder>,
}
