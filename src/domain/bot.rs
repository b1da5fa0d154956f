use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// A configurable chatbot. Owned by exactly one account at a time.
///
/// Bots are soft-deleted so that listings and payouts referencing them stay
/// auditable.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    pub id: String,
    pub name: String,
    pub motto: String,
    pub creator_identity_key: String,
    pub owner_identity_key: String,
    pub training_messages: Vec<ChatMessage>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Bot {
    pub fn new(
        creator: impl Into<String>,
        name: impl Into<String>,
        motto: impl Into<String>,
        training_messages: Vec<ChatMessage>,
    ) -> Result<Self> {
        let creator = creator.into();
        let name = name.into();
        if name.trim().is_empty() {
            return Err(MarketError::ValidationError(
                "Bot name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            id: random_id(),
            name,
            motto: motto.into(),
            owner_identity_key: creator.clone(),
            creator_identity_key: creator,
            training_messages,
            deleted: false,
            created_at: Utc::now(),
        })
    }

    pub fn is_owned_by(&self, identity_key: &str) -> bool {
        !self.deleted && self.owner_identity_key == identity_key
    }
}

/// Public view of a bot; the training prompt stays private to its owner.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BotSummary {
    pub id: String,
    pub name: String,
    pub motto: String,
    pub creator_identity_key: String,
    pub owner_identity_key: String,
}

impl From<&Bot> for BotSummary {
    fn from(bot: &Bot) -> Self {
        Self {
            id: bot.id.clone(),
            name: bot.name.clone(),
            motto: bot.motto.clone(),
            creator_identity_key: bot.creator_identity_key.clone(),
            owner_identity_key: bot.owner_identity_key.clone(),
        }
    }
}

/// 12 random bytes, hex encoded.
pub fn random_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
