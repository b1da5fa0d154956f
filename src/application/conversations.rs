use crate::application::ledger::AccountLedger;
use crate::domain::bot::{Bot, ChatMessage, Role};
use crate::domain::conversation::{Conversation, ConversationMessage, require_content};
use crate::domain::ports::{AiResponder, MarketStoreRef};
use crate::error::{MarketError, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Chat threads between a bot's owner and the bot.
///
/// Every operation checks that the caller is registered and currently owns
/// the bot. Threads follow their owner, so a previous owner of a resold bot
/// keeps no access to the bot and the new owner sees only threads they started
/// or that were seeded from their trial.
#[derive(Clone)]
pub struct BotConversations {
    store: MarketStoreRef,
    ledger: AccountLedger,
    responder: Arc<dyn AiResponder>,
}

impl BotConversations {
    pub fn new(store: MarketStoreRef, ledger: AccountLedger, responder: Arc<dyn AiResponder>) -> Self {
        Self {
            store,
            ledger,
            responder,
        }
    }

    pub async fn create(&self, owner: &str, bot_id: &str, title: &str) -> Result<Conversation> {
        self.owned_bot(owner, bot_id).await?;
        let conversation = Conversation::new(owner, bot_id, title);
        self.store
            .insert_conversation(conversation.clone(), Vec::new())
            .await?;
        info!(owner, bot_id, conversation_id = %conversation.id, "created conversation");
        Ok(conversation)
    }

    pub async fn list_with_bot(&self, owner: &str, bot_id: &str) -> Result<Vec<Conversation>> {
        self.owned_bot(owner, bot_id).await?;
        self.store.conversations_for(owner, bot_id).await
    }

    pub async fn messages(
        &self,
        owner: &str,
        bot_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ConversationMessage>> {
        self.owned_bot(owner, bot_id).await?;
        self.accessible(owner, bot_id, conversation_id).await?;
        self.store.conversation_messages(conversation_id).await
    }

    /// Sends `message` to the bot and stores both turns. Returns the reply.
    ///
    /// The prompt is the bot's training followed by the stored history and
    /// the new message. Nothing is stored if the responder fails.
    pub async fn send_message(
        &self,
        owner: &str,
        bot_id: &str,
        conversation_id: &str,
        message: &str,
    ) -> Result<String> {
        let message = require_content(message)?;
        let bot = self.owned_bot(owner, bot_id).await?;
        self.accessible(owner, bot_id, conversation_id).await?;

        let history = self.store.conversation_messages(conversation_id).await?;
        let mut prompt = bot.training_messages;
        prompt.extend(history.iter().map(ConversationMessage::to_chat));
        let user_turn = ChatMessage::user(message);
        prompt.push(user_turn.clone());

        let reply = self.responder.respond(&prompt).await.inspect_err(|err| {
            warn!(owner, bot_id, conversation_id, error = %err, "bot reply failed");
        })?;

        self.store
            .append_messages(
                conversation_id,
                vec![
                    ConversationMessage::new(conversation_id, user_turn),
                    ConversationMessage::new(
                        conversation_id,
                        ChatMessage::new(Role::Assistant, reply.clone()),
                    ),
                ],
            )
            .await?;
        info!(owner, bot_id, conversation_id, "bot replied");
        Ok(reply)
    }

    async fn owned_bot(&self, owner: &str, bot_id: &str) -> Result<Bot> {
        self.ledger.account(owner).await?;
        let bot = self
            .store
            .bot(bot_id)
            .await?
            .filter(|bot| !bot.deleted)
            .ok_or_else(|| MarketError::NotFound(format!("bot {}", bot_id)))?;
        if !bot.is_owned_by(owner) {
            return Err(MarketError::Unauthorized(
                "You do not appear to own this bot!".to_string(),
            ));
        }
        Ok(bot)
    }

    async fn accessible(&self, owner: &str, bot_id: &str, conversation_id: &str) -> Result<()> {
        let conversation = self
            .store
            .conversation(conversation_id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("conversation {}", conversation_id)))?;
        if !conversation.is_accessible(owner, bot_id) {
            return Err(MarketError::Unauthorized(
                "This bot does not appear to have access to this conversation!".to_string(),
            ));
        }
        Ok(())
    }
}
