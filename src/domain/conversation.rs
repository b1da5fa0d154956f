use crate::domain::bot::{ChatMessage, Role, random_id};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "New conversation";

/// A chat thread between a bot's owner and that bot.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(rename = "conversationID")]
    pub id: String,
    pub owner_identity_key: String,
    #[serde(rename = "botID")]
    pub bot_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Blank titles fall back to [`DEFAULT_TITLE`].
    pub fn new(
        owner: impl Into<String>,
        bot_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let title = if title.trim().is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            title
        };
        Self {
            id: random_id(),
            owner_identity_key: owner.into(),
            bot_id: bot_id.into(),
            title,
            created_at: Utc::now(),
        }
    }

    /// Whether `bot_id` may read and extend this thread on behalf of `owner`.
    pub fn is_accessible(&self, owner: &str, bot_id: &str) -> bool {
        self.bot_id == bot_id && self.owner_identity_key == owner
    }
}

/// One stored turn of a conversation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    #[serde(rename = "conversationID")]
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(conversation_id: impl Into<String>, message: ChatMessage) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            role: message.role,
            content: message.content,
            created_at: Utc::now(),
        }
    }

    pub fn to_chat(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// Rejects messages with nothing to say.
pub fn require_content(message: &str) -> Result<&str> {
    if message.trim().is_empty() {
        return Err(MarketError::ValidationError(
            "Message must not be empty".to_string(),
        ));
    }
    Ok(message)
}
