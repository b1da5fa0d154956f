use crate::application::ledger::AccountLedger;
use crate::config::MarketConfig;
use crate::domain::bot::{Bot, BotSummary, ChatMessage};
use crate::domain::conversation::{Conversation, ConversationMessage};
use crate::domain::listing::{Credits, Listing, ListingView, SaleSettlement};
use crate::domain::money::{RevenueSplit, Units};
use crate::domain::ports::{AiResponder, MarketStoreRef};
use crate::error::{MarketError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

const TRIAL_CONVERSATION_TITLE: &str = "Trial conversation";

/// A completed purchase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    #[serde(rename = "botID")]
    pub bot_id: String,
    pub listing_id: String,
    pub split: RevenueSplit,
    /// Set when trial messages were carried over into a starter conversation.
    pub conversation_id: Option<String>,
}

/// A sample reply bought before committing to a purchase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialReply {
    #[serde(rename = "botID")]
    pub bot_id: String,
    pub reply: String,
    pub split: RevenueSplit,
}

/// Bots, listings and the settlement of sales and trials.
#[derive(Clone)]
pub struct MarketplaceEscrow {
    store: MarketStoreRef,
    ledger: AccountLedger,
    config: Arc<MarketConfig>,
    responder: Arc<dyn AiResponder>,
}

impl MarketplaceEscrow {
    pub fn new(
        store: MarketStoreRef,
        ledger: AccountLedger,
        config: Arc<MarketConfig>,
        responder: Arc<dyn AiResponder>,
    ) -> Self {
        Self {
            store,
            ledger,
            config,
            responder,
        }
    }

    pub async fn create_bot(
        &self,
        creator: &str,
        name: &str,
        motto: &str,
        training_messages: Vec<ChatMessage>,
    ) -> Result<Bot> {
        self.ledger.account(creator).await?;
        let bot = Bot::new(creator, name, motto, training_messages)?;
        self.store.insert_bot(bot.clone()).await?;
        info!(creator, bot_id = %bot.id, "created bot");
        Ok(bot)
    }

    pub async fn own_bots(&self, owner: &str) -> Result<Vec<BotSummary>> {
        self.ledger.account(owner).await?;
        let bots = self.store.bots_owned_by(owner).await?;
        Ok(bots.iter().map(BotSummary::from).collect())
    }

    pub async fn delete_bot(&self, owner: &str, bot_id: &str) -> Result<()> {
        self.ledger.account(owner).await?;
        self.store.delete_bot(owner, bot_id).await?;
        info!(owner, bot_id, "deleted bot");
        Ok(())
    }

    /// Offers an owned bot for sale.
    pub async fn list(&self, seller: &str, bot_id: &str, ask_price: Units) -> Result<Listing> {
        self.ledger.account(seller).await?;
        if ask_price < self.config.minimum_ask_price {
            return Err(MarketError::ValidationError(format!(
                "The asking price must be at least {}",
                self.config.minimum_ask_price
            )));
        }
        let listing = Listing::new(bot_id, seller, ask_price);
        self.store.insert_listing(listing.clone()).await?;
        info!(seller, bot_id, %ask_price, "listed bot");
        Ok(listing)
    }

    pub async fn delist(&self, seller: &str, bot_id: &str) -> Result<Listing> {
        self.ledger.account(seller).await?;
        let listing = self.store.remove_listing(seller, bot_id).await?;
        info!(seller, bot_id, "delisted bot");
        Ok(listing)
    }

    pub async fn listings(&self) -> Result<Vec<ListingView>> {
        let mut views = Vec::new();
        for listing in self.store.active_listings().await? {
            let Some(bot) = self.store.bot(&listing.bot_id).await? else {
                continue;
            };
            let seller_name = self
                .store
                .account(&listing.seller)
                .await?
                .map(|account| account.display_name)
                .unwrap_or_default();
            views.push(ListingView {
                bot_id: listing.bot_id,
                name: bot.name,
                motto: bot.motto,
                seller: listing.seller,
                seller_name,
                ask_price: listing.ask_price,
                created_at: listing.created_at,
            });
        }
        Ok(views)
    }

    pub async fn price(&self, bot_id: &str) -> Result<Units> {
        self.store
            .active_listing(bot_id)
            .await?
            .map(|listing| listing.ask_price)
            .ok_or_else(|| {
                MarketError::NotFound(
                    "The bot is not on the marketplace, or it is already sold!".to_string(),
                )
            })
    }

    /// Buys a listed bot with a payment the caller has already made.
    ///
    /// The sale commits as one unit in the store: the listing flips to sold,
    /// seller, creator and platform are credited and the bot changes hands.
    /// A buyer who loses the race for the listing is refunded the payment
    /// minus the handling fee.
    pub async fn purchase(
        &self,
        buyer: &str,
        bot_id: &str,
        payment_amount: Units,
        trial_messages: Option<Vec<ChatMessage>>,
    ) -> Result<Purchase> {
        self.ledger.account(buyer).await?;
        let payment_amount = payment_amount.positive()?;

        let Some(listing) = self.store.active_listing(bot_id).await? else {
            return Err(self.refund_lost_race(buyer, bot_id, payment_amount).await?);
        };
        if listing.seller == buyer {
            let refunded = self.refund(buyer, payment_amount).await?;
            return Err(MarketError::ValidationError(format!(
                "You cannot buy your own bot, {} units were refunded",
                refunded
            )));
        }
        if payment_amount < listing.ask_price {
            let refunded = self.refund(buyer, payment_amount).await?;
            return Err(MarketError::ValidationError(format!(
                "Payment of {} is below the asking price of {}, {} units were refunded",
                payment_amount, listing.ask_price, refunded
            )));
        }
        let bot = self.live_bot(bot_id).await?;

        let split = RevenueSplit::compute(
            payment_amount,
            self.config.sale_seller_share,
            self.config.sale_creator_share,
        )?;
        let credits = self.credits(&listing.seller, &bot.creator_identity_key, split);
        let credited = credits.total();
        let settlement = SaleSettlement {
            listing_id: listing.listing_id.clone(),
            bot_id: bot_id.to_string(),
            buyer: buyer.to_string(),
            credits,
        };
        if !self.store.settle_sale(settlement).await? {
            return Err(self.refund_lost_race(buyer, bot_id, payment_amount).await?);
        }
        info!(
            buyer,
            bot_id,
            seller = %listing.seller,
            %credited,
            seller_share = %split.seller,
            creator_share = %split.creator,
            platform_share = %split.platform,
            "sold bot"
        );

        let conversation_id = match trial_messages {
            Some(messages) if !messages.is_empty() => {
                self.seed_conversation(buyer, bot_id, &messages).await
            }
            _ => None,
        };

        Ok(Purchase {
            bot_id: bot_id.to_string(),
            listing_id: listing.listing_id,
            split,
            conversation_id,
        })
    }

    /// Pays for one sample reply from a listed bot without buying it.
    ///
    /// The reply is produced first; the payment is only split once the
    /// listing is confirmed still active. If there is nothing to reply to,
    /// the responder fails or the listing disappears, the buyer is refunded
    /// minus the handling fee.
    pub async fn try_before_buy(
        &self,
        buyer: &str,
        bot_id: &str,
        trial_messages: Vec<ChatMessage>,
        payment_amount: Units,
    ) -> Result<TrialReply> {
        self.ledger.account(buyer).await?;
        let payment_amount = payment_amount.positive()?;
        if trial_messages.is_empty() {
            let refunded = self.refund(buyer, payment_amount).await?;
            warn!(buyer, bot_id, %refunded, "trial without messages, refunded buyer");
            return Err(MarketError::ValidationError(format!(
                "At least one trial message is required, {} units were refunded",
                refunded
            )));
        }

        let Some(listing) = self.store.active_listing(bot_id).await? else {
            return Err(self.refund_lost_race(buyer, bot_id, payment_amount).await?);
        };
        let bot = self.live_bot(bot_id).await?;

        let mut conversation = bot.training_messages.clone();
        conversation.extend(trial_messages);
        let reply = match self.responder.respond(&conversation).await {
            Ok(reply) => reply,
            Err(err) => {
                let refunded = self.refund(buyer, payment_amount).await?;
                warn!(buyer, bot_id, %refunded, error = %err, "trial reply failed");
                return Err(err);
            }
        };

        let split = RevenueSplit::compute(
            payment_amount,
            self.config.trial_seller_share,
            self.config.trial_creator_share,
        )?;
        let credits = self.credits(&listing.seller, &bot.creator_identity_key, split);
        let credited = credits.total();
        if !self.store.settle_trial(&listing.listing_id, credits).await? {
            return Err(self.refund_lost_race(buyer, bot_id, payment_amount).await?);
        }
        info!(buyer, bot_id, seller = %listing.seller, %credited, "settled trial");

        Ok(TrialReply {
            bot_id: bot_id.to_string(),
            reply,
            split,
        })
    }

    async fn live_bot(&self, bot_id: &str) -> Result<Bot> {
        self.store
            .bot(bot_id)
            .await?
            .filter(|bot| !bot.deleted)
            .ok_or_else(|| MarketError::NotFound(format!("bot {}", bot_id)))
    }

    fn credits(&self, seller: &str, creator: &str, split: RevenueSplit) -> Credits {
        let mut credits = Credits::new();
        credits.push(seller, split.seller);
        credits.push(creator, split.creator);
        if let Some(platform) = &self.config.platform_account {
            credits.push(platform.as_str(), split.platform);
        }
        credits
    }

    /// Credits the payment back minus the handling fee. Returns the refund.
    async fn refund(&self, buyer: &str, payment_amount: Units) -> Result<Units> {
        let refund = payment_amount.saturating_sub(self.config.handling_fee);
        if !refund.is_zero() {
            self.ledger.credit(buyer, refund).await?;
        }
        Ok(refund)
    }

    async fn refund_lost_race(
        &self,
        buyer: &str,
        bot_id: &str,
        payment_amount: Units,
    ) -> Result<MarketError> {
        let refunded = self.refund(buyer, payment_amount).await?;
        warn!(buyer, bot_id, %refunded, "bot no longer for sale, refunded buyer");
        Ok(MarketError::AlreadySold {
            bot_id: bot_id.to_string(),
            refunded,
        })
    }

    async fn seed_conversation(
        &self,
        buyer: &str,
        bot_id: &str,
        messages: &[ChatMessage],
    ) -> Option<String> {
        let conversation = Conversation::new(buyer, bot_id, TRIAL_CONVERSATION_TITLE);
        let id = conversation.id.clone();
        let turns = messages
            .iter()
            .cloned()
            .map(|message| ConversationMessage::new(&id, message))
            .collect();
        match self.store.insert_conversation(conversation, turns).await {
            Ok(()) => Some(id),
            Err(err) => {
                warn!(buyer, bot_id, error = %err, "could not seed starter conversation");
                None
            }
        }
    }
}
