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
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Column Family for account rows, keyed by identity key.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for bots, keyed by bot id.
pub const CF_BOTS: &str = "bots";
/// Column Family for listings, keyed by listing id.
pub const CF_LISTINGS: &str = "listings";
/// Column Family for payouts, keyed by payment id.
pub const CF_PAYOUTS: &str = "payouts";
/// Column Family for conversations, keyed by conversation id.
pub const CF_CONVERSATIONS: &str = "conversations";
/// Column Family for conversation turns, keyed by `{conversation_id}/{seq}`.
pub const CF_MESSAGES: &str = "messages";
/// Column Family of secondary keys pointing at rows in the other families.
///
/// * `active/{bot_id}` holds the id of the bot's live listing.
/// * `owner/{identity_key}/{bot_id}` marks a bot's current owner.
/// * `pending/{recipient}` holds the id of the recipient's unacknowledged payout.
/// * `payout/{recipient}/{payment_id}` lists every payout of a recipient.
/// * `nonce/{prefix}/{suffix}` holds the payout that used a derivation pair.
/// * `conversation/{owner}/{bot_id}/{conversation_id}` lists a bot's threads.
pub const CF_INDEX: &str = "index";

const FAMILIES: [&str; 7] = [
    CF_ACCOUNTS,
    CF_BOTS,
    CF_LISTINGS,
    CF_PAYOUTS,
    CF_CONVERSATIONS,
    CF_MESSAGES,
    CF_INDEX,
];

fn active_key(bot_id: &str) -> String {
    format!("active/{}", bot_id)
}

fn owner_key(owner: &str, bot_id: &str) -> String {
    format!("owner/{}/{}", owner, bot_id)
}

fn pending_key(recipient: &str) -> String {
    format!("pending/{}", recipient)
}

fn payout_key(recipient: &str, payment_id: &str) -> String {
    format!("payout/{}/{}", recipient, payment_id)
}

fn nonce_key(nonces: &DerivationNonces) -> String {
    format!(
        "nonce/{}/{}",
        nonces.derivation_prefix, nonces.derivation_suffix
    )
}

fn conversation_key(owner: &str, bot_id: &str, conversation_id: &str) -> String {
    format!("conversation/{}/{}/{}", owner, bot_id, conversation_id)
}

fn message_key(conversation_id: &str, seq: usize) -> String {
    format!("{}{:08}", message_key_prefix(conversation_id), seq)
}

fn message_key_prefix(conversation_id: &str) -> String {
    format!("{}/", conversation_id)
}

/// A persistent store implementation using RocksDB.
///
/// Each entity lives in its own Column Family. Mutations take the writer
/// gate, read and validate the rows they touch, then commit every change in a
/// single `WriteBatch`, so a failed operation leaves nothing behind. Lookups by
/// bot, owner or recipient go through [`CF_INDEX`], which is maintained in the
/// same batch as the rows it points at.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = FAMILIES
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            MarketError::InternalError(Box::new(std::io::Error::other(format!(
                "{} column family not found",
                name
            ))))
        })
    }

    fn get<T: DeserializeOwned>(&self, family: &str, key: &str) -> Result<Option<T>> {
        let cf = self.cf(family)?;
        match self.db.get_pinned_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Rows of `family` whose key starts with `prefix`, in key order.
    fn scan_prefix<T: DeserializeOwned>(&self, family: &str, prefix: &str) -> Result<Vec<T>> {
        let cf = self.cf(family)?;
        let mode = IteratorMode::From(prefix.as_bytes(), Direction::Forward);
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    /// Follows the index entries under `prefix` to rows of `family`.
    fn indexed<T: DeserializeOwned>(&self, family: &str, prefix: &str) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        for id in self.scan_prefix::<String>(CF_INDEX, prefix)? {
            if let Some(row) = self.get(family, &id)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn put<T: Serialize>(&self, batch: &mut WriteBatch, family: &str, key: &str, value: &T) -> Result<()> {
        let cf = self.cf(family)?;
        batch.put_cf(cf, key.as_bytes(), serde_json::to_vec(value)?);
        Ok(())
    }

    async fn write_gate(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    fn require_account(&self, identity_key: &str) -> Result<Account> {
        self.get(CF_ACCOUNTS, identity_key)?
            .ok_or_else(|| MarketError::NotFound(format!("account {}", identity_key)))
    }

    fn delete(&self, batch: &mut WriteBatch, family: &str, key: &str) -> Result<()> {
        let cf = self.cf(family)?;
        batch.delete_cf(cf, key.as_bytes());
        Ok(())
    }

    fn find_active_listing(&self, bot_id: &str) -> Result<Option<Listing>> {
        let Some(listing_id) = self.get::<String>(CF_INDEX, &active_key(bot_id))? else {
            return Ok(None);
        };
        Ok(self
            .get::<Listing>(CF_LISTINGS, &listing_id)?
            .filter(Listing::is_active))
    }

    fn find_unacknowledged(&self, recipient: &str) -> Result<Option<PendingTransaction>> {
        let Some(payment_id) = self.get::<String>(CF_INDEX, &pending_key(recipient))? else {
            return Ok(None);
        };
        Ok(self
            .get::<PendingTransaction>(CF_PAYOUTS, &payment_id)?
            .filter(|tx| !tx.acknowledged))
    }

    fn require_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        self.get(CF_CONVERSATIONS, conversation_id)?
            .ok_or_else(|| MarketError::NotFound(format!("conversation {}", conversation_id)))
    }

    fn stage_messages(
        &self,
        batch: &mut WriteBatch,
        conversation_id: &str,
        first_seq: usize,
        messages: &[ConversationMessage],
    ) -> Result<()> {
        for (offset, message) in messages.iter().enumerate() {
            let key = message_key(conversation_id, first_seq + offset);
            self.put(batch, CF_MESSAGES, &key, message)?;
        }
        Ok(())
    }

    /// Stages credited account rows into `batch`. Nothing is written on error.
    fn stage_credits(&self, batch: &mut WriteBatch, credits: &Credits) -> Result<()> {
        let mut staged: HashMap<String, Account> = HashMap::new();
        for (key, amount) in credits.iter() {
            let mut account = match staged.remove(key) {
                Some(account) => account,
                None => self.require_account(key)?,
            };
            account.credit(amount)?;
            staged.insert(key.to_string(), account);
        }
        for (key, account) in &staged {
            self.put(batch, CF_ACCOUNTS, key, account)?;
        }
        Ok(())
    }

    async fn update_account<F>(&self, identity_key: &str, change: F) -> Result<Units>
    where
        F: FnOnce(&mut Account) -> Result<()> + Send,
    {
        let _gate = self.write_gate().await;
        let mut account = self.require_account(identity_key)?;
        change(&mut account)?;
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_ACCOUNTS, identity_key, &account)?;
        self.db.write(batch)?;
        Ok(account.balance)
    }
}

#[async_trait]
impl MarketStore for RocksDBStore {
    async fn insert_account(&self, account: Account) -> Result<()> {
        let _gate = self.write_gate().await;
        if self.get::<Account>(CF_ACCOUNTS, &account.identity_key)?.is_some() {
            return Err(MarketError::Conflict(format!(
                "account {} is already registered",
                account.identity_key
            )));
        }
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_ACCOUNTS, &account.identity_key, &account)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn account(&self, identity_key: &str) -> Result<Option<Account>> {
        self.get(CF_ACCOUNTS, identity_key)
    }

    async fn credit(&self, identity_key: &str, amount: Units) -> Result<Units> {
        self.update_account(identity_key, |account| account.credit(amount))
            .await
    }

    async fn debit(&self, identity_key: &str, amount: Units) -> Result<Units> {
        self.update_account(identity_key, |account| account.debit(amount))
            .await
    }

    async fn balances(&self, identity_key: &str) -> Result<Option<BalanceView>> {
        // Readers take the gate too so a payout's debit and record are seen together.
        let _gate = self.write_gate().await;
        let Some(account) = self.get::<Account>(CF_ACCOUNTS, identity_key)? else {
            return Ok(None);
        };
        let unacknowledged = self
            .find_unacknowledged(identity_key)?
            .map(|tx| tx.amount)
            .unwrap_or(Units::ZERO);
        Ok(Some(BalanceView {
            resting: account.balance,
            unacknowledged,
        }))
    }

    async fn insert_bot(&self, bot: Bot) -> Result<()> {
        let _gate = self.write_gate().await;
        if self.get::<Bot>(CF_BOTS, &bot.id)?.is_some() {
            return Err(MarketError::Conflict(format!("bot {} already exists", bot.id)));
        }
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_BOTS, &bot.id, &bot)?;
        self.put(&mut batch, CF_INDEX, &owner_key(&bot.owner_identity_key, &bot.id), &bot.id)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn bot(&self, bot_id: &str) -> Result<Option<Bot>> {
        self.get(CF_BOTS, bot_id)
    }

    async fn bots_owned_by(&self, identity_key: &str) -> Result<Vec<Bot>> {
        let prefix = owner_key(identity_key, "");
        Ok(self
            .indexed::<Bot>(CF_BOTS, &prefix)?
            .into_iter()
            .filter(|bot| bot.is_owned_by(identity_key))
            .collect())
    }

    async fn delete_bot(&self, owner: &str, bot_id: &str) -> Result<()> {
        let _gate = self.write_gate().await;
        if self.find_active_listing(bot_id)?.is_some() {
            return Err(MarketError::Conflict(format!(
                "bot {} is listed on the marketplace",
                bot_id
            )));
        }
        let mut bot = self
            .get::<Bot>(CF_BOTS, bot_id)?
            .filter(|bot| !bot.deleted)
            .ok_or_else(|| MarketError::NotFound(format!("bot {}", bot_id)))?;
        if bot.owner_identity_key != owner {
            return Err(MarketError::Unauthorized(
                "You do not appear to own this bot!".to_string(),
            ));
        }
        bot.deleted = true;
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_BOTS, bot_id, &bot)?;
        self.delete(&mut batch, CF_INDEX, &owner_key(owner, bot_id))?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn insert_listing(&self, listing: Listing) -> Result<()> {
        let _gate = self.write_gate().await;
        let bot = self
            .get::<Bot>(CF_BOTS, &listing.bot_id)?
            .filter(|bot| !bot.deleted)
            .ok_or_else(|| MarketError::NotFound(format!("bot {}", listing.bot_id)))?;
        if bot.owner_identity_key != listing.seller {
            return Err(MarketError::Unauthorized(
                "You do not appear to own this bot!".to_string(),
            ));
        }
        if self.find_active_listing(&listing.bot_id)?.is_some() {
            return Err(MarketError::Conflict(
                "This bot is already on the marketplace!".to_string(),
            ));
        }
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_LISTINGS, &listing.listing_id, &listing)?;
        self.put(&mut batch, CF_INDEX, &active_key(&listing.bot_id), &listing.listing_id)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn active_listing(&self, bot_id: &str) -> Result<Option<Listing>> {
        self.find_active_listing(bot_id)
    }

    async fn active_listings(&self) -> Result<Vec<Listing>> {
        let mut listings: Vec<Listing> = self
            .indexed::<Listing>(CF_LISTINGS, "active/")?
            .into_iter()
            .filter(Listing::is_active)
            .collect();
        listings.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(listings)
    }

    async fn remove_listing(&self, seller: &str, bot_id: &str) -> Result<Listing> {
        let _gate = self.write_gate().await;
        let listing = self
            .find_active_listing(bot_id)?
            .ok_or_else(|| MarketError::NotFound(format!("no active listing for bot {}", bot_id)))?;
        if listing.seller != seller {
            return Err(MarketError::Unauthorized(
                "You did not list this bot".to_string(),
            ));
        }
        let mut batch = WriteBatch::default();
        self.delete(&mut batch, CF_LISTINGS, &listing.listing_id)?;
        self.delete(&mut batch, CF_INDEX, &active_key(bot_id))?;
        self.db.write(batch)?;
        Ok(listing)
    }

    async fn settle_sale(&self, settlement: SaleSettlement) -> Result<bool> {
        let _gate = self.write_gate().await;
        let Some(mut listing) = self
            .get::<Listing>(CF_LISTINGS, &settlement.listing_id)?
            .filter(|listing| listing.is_active() && listing.bot_id == settlement.bot_id)
        else {
            return Ok(false);
        };
        let mut bot = self
            .get::<Bot>(CF_BOTS, &settlement.bot_id)?
            .ok_or_else(|| MarketError::NotFound(format!("bot {}", settlement.bot_id)))?;

        let mut batch = WriteBatch::default();
        self.stage_credits(&mut batch, &settlement.credits)?;
        listing.sold = true;
        listing.updated_at = Utc::now();
        self.put(&mut batch, CF_LISTINGS, &listing.listing_id, &listing)?;
        self.delete(&mut batch, CF_INDEX, &active_key(&bot.id))?;
        self.delete(&mut batch, CF_INDEX, &owner_key(&bot.owner_identity_key, &bot.id))?;
        bot.owner_identity_key = settlement.buyer;
        self.put(&mut batch, CF_INDEX, &owner_key(&bot.owner_identity_key, &bot.id), &bot.id)?;
        self.put(&mut batch, CF_BOTS, &bot.id, &bot)?;
        self.db.write(batch)?;
        Ok(true)
    }

    async fn settle_trial(&self, listing_id: &str, credits: Credits) -> Result<bool> {
        let _gate = self.write_gate().await;
        let active = self
            .get::<Listing>(CF_LISTINGS, listing_id)?
            .is_some_and(|listing| listing.is_active());
        if !active {
            return Ok(false);
        }
        let mut batch = WriteBatch::default();
        self.stage_credits(&mut batch, &credits)?;
        self.db.write(batch)?;
        Ok(true)
    }

    async fn unacknowledged_payout(
        &self,
        recipient: &str,
    ) -> Result<Option<PendingTransaction>> {
        self.find_unacknowledged(recipient)
    }

    async fn nonces_in_use(&self, nonces: &DerivationNonces) -> Result<bool> {
        Ok(self.get::<String>(CF_INDEX, &nonce_key(nonces))?.is_some())
    }

    async fn record_payout(&self, payout: PendingTransaction) -> Result<PayoutRecord> {
        let _gate = self.write_gate().await;
        if let Some(existing) = self.find_unacknowledged(&payout.recipient)? {
            return Ok(PayoutRecord::Existing(existing));
        }
        if self.get::<String>(CF_INDEX, &nonce_key(&payout.nonces))?.is_some() {
            return Err(MarketError::Conflict(
                "derivation nonces have already been used".to_string(),
            ));
        }
        if self
            .get::<PendingTransaction>(CF_PAYOUTS, &payout.payment_id)?
            .is_some()
        {
            return Err(MarketError::Conflict(format!(
                "payment {} already exists",
                payout.payment_id
            )));
        }

        let mut account = self.require_account(&payout.recipient)?;
        account.debit(payout.amount)?;
        let id = &payout.payment_id;
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_ACCOUNTS, &account.identity_key, &account)?;
        self.put(&mut batch, CF_PAYOUTS, id, &payout)?;
        self.put(&mut batch, CF_INDEX, &pending_key(&payout.recipient), id)?;
        self.put(&mut batch, CF_INDEX, &payout_key(&payout.recipient, id), id)?;
        self.put(&mut batch, CF_INDEX, &nonce_key(&payout.nonces), id)?;
        self.db.write(batch)?;
        Ok(PayoutRecord::Recorded(payout))
    }

    async fn acknowledge_payout(
        &self,
        recipient: &str,
        payment_id: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingTransaction> {
        let _gate = self.write_gate().await;
        let mut payout = self
            .get::<PendingTransaction>(CF_PAYOUTS, payment_id)?
            .filter(|tx| tx.recipient == recipient)
            .ok_or_else(|| MarketError::NotFound("Payment not found!".to_string()))?;
        if payout.acknowledged {
            return Err(MarketError::AlreadyAcknowledged(payment_id.to_string()));
        }
        payout.acknowledge(at);
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_PAYOUTS, payment_id, &payout)?;
        self.delete(&mut batch, CF_INDEX, &pending_key(recipient))?;
        self.db.write(batch)?;
        Ok(payout)
    }

    async fn payouts_for(&self, recipient: &str) -> Result<Vec<PendingTransaction>> {
        let mut payouts: Vec<PendingTransaction> =
            self.indexed(CF_PAYOUTS, &payout_key(recipient, ""))?;
        payouts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(payouts)
    }

    async fn insert_conversation(
        &self,
        conversation: Conversation,
        messages: Vec<ConversationMessage>,
    ) -> Result<()> {
        let _gate = self.write_gate().await;
        let id = &conversation.id;
        if self.get::<Conversation>(CF_CONVERSATIONS, id)?.is_some() {
            return Err(MarketError::Conflict(format!(
                "conversation {} already exists",
                id
            )));
        }
        let index = conversation_key(&conversation.owner_identity_key, &conversation.bot_id, id);
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_CONVERSATIONS, id, &conversation)?;
        self.put(&mut batch, CF_INDEX, &index, id)?;
        self.stage_messages(&mut batch, id, 0, &messages)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        self.get(CF_CONVERSATIONS, conversation_id)
    }

    async fn conversations_for(&self, owner: &str, bot_id: &str) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> =
            self.indexed(CF_CONVERSATIONS, &conversation_key(owner, bot_id, ""))?;
        conversations.retain(|c| c.is_accessible(owner, bot_id));
        conversations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(conversations)
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ConversationMessage>> {
        self.scan_prefix(CF_MESSAGES, &message_key_prefix(conversation_id))
    }

    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: Vec<ConversationMessage>,
    ) -> Result<()> {
        let _gate = self.write_gate().await;
        self.require_conversation(conversation_id)?;
        let stored = self
            .scan_prefix::<ConversationMessage>(CF_MESSAGES, &message_key_prefix(conversation_id))?
            .len();
        let mut batch = WriteBatch::default();
        self.stage_messages(&mut batch, conversation_id, stored, &messages)?;
        self.db.write(batch)?;
        Ok(())
    }
}
