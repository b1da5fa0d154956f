//! The externally exposed operations, enumerated.
//!
//! Each [`Command`] names an operation, the request fields it cannot run
//! without, and the handler that serves it. Requests are JSON objects of the
//! form `{"operation": "<name>", ...fields}`; field names follow the wire
//! names (`identityKey`, `botID`, `conversationID`, `paymentAmount`,
//! `paymentID`, ...).

use crate::application::market::Marketplace;
use crate::domain::bot::ChatMessage;
use crate::domain::money::Units;
use crate::error::{MarketError, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub type Handler = for<'a> fn(&'a Marketplace, Params) -> BoxFuture<'a, Result<Value>>;

pub struct Command {
    pub name: &'static str,
    pub required: &'static [&'static str],
    pub handler: Handler,
}

pub static COMMANDS: &[Command] = &[
    Command {
        name: "createUser",
        required: &["identityKey", "name"],
        handler: create_user,
    },
    Command {
        name: "getOwnProfile",
        required: &["identityKey"],
        handler: get_own_profile,
    },
    Command {
        name: "getBalance",
        required: &["identityKey"],
        handler: get_balance,
    },
    Command {
        name: "createBot",
        required: &["identityKey", "name"],
        handler: create_bot,
    },
    Command {
        name: "listOwnBots",
        required: &["identityKey"],
        handler: list_own_bots,
    },
    Command {
        name: "deleteBot",
        required: &["identityKey", "botID"],
        handler: delete_bot,
    },
    Command {
        name: "listBotOnMarketplace",
        required: &["identityKey", "botID", "amount"],
        handler: list_bot,
    },
    Command {
        name: "removeBotFromMarketplace",
        required: &["identityKey", "botID"],
        handler: delist_bot,
    },
    Command {
        name: "listMarketplaceBots",
        required: &[],
        handler: list_marketplace_bots,
    },
    Command {
        name: "getPriceForBot",
        required: &["botID"],
        handler: get_price_for_bot,
    },
    Command {
        name: "buyBotFromMarketplace",
        required: &["identityKey", "botID", "paymentAmount"],
        handler: buy_bot,
    },
    Command {
        name: "tryBeforeBuy",
        required: &["identityKey", "botID", "trialMessages", "paymentAmount"],
        handler: try_before_buy,
    },
    Command {
        name: "createConversation",
        required: &["identityKey", "botID"],
        handler: create_conversation,
    },
    Command {
        name: "listConversationsWithBot",
        required: &["identityKey", "botID"],
        handler: list_conversations,
    },
    Command {
        name: "listConversationMessages",
        required: &["identityKey", "botID", "conversationID"],
        handler: list_conversation_messages,
    },
    Command {
        name: "sendMessage",
        required: &["identityKey", "botID", "conversationID", "message"],
        handler: send_message,
    },
    Command {
        name: "cashOut",
        required: &["identityKey"],
        handler: cash_out,
    },
    Command {
        name: "acknowledgePayment",
        required: &["identityKey", "paymentID"],
        handler: acknowledge_payment,
    },
    Command {
        name: "listPayments",
        required: &["identityKey"],
        handler: list_payments,
    },
];

/// One incoming request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub operation: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// Request fields with typed accessors.
#[derive(Debug, Clone, Default)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|value| !value.is_null())
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.field(name)
            .and_then(Value::as_str)
            .ok_or_else(|| MarketError::ValidationError(format!("{} must be a string", name)))
    }

    pub fn optional_str(&self, name: &str) -> Result<Option<&str>> {
        match self.field(name) {
            Some(_) => self.str(name).map(Some),
            None => Ok(None),
        }
    }

    pub fn units(&self, name: &str) -> Result<Units> {
        self.field(name)
            .and_then(Value::as_u64)
            .map(Units::new)
            .ok_or_else(|| {
                MarketError::ValidationError(format!(
                    "{} must be a non-negative whole number",
                    name
                ))
            })
    }

    pub fn messages(&self, name: &str) -> Result<Vec<ChatMessage>> {
        let value = self
            .field(name)
            .cloned()
            .ok_or_else(|| MarketError::ValidationError(format!("{} is required", name)))?;
        serde_json::from_value(value).map_err(|e| {
            MarketError::ValidationError(format!("{} must be a list of messages: {}", name, e))
        })
    }

    pub fn optional_messages(&self, name: &str) -> Result<Option<Vec<ChatMessage>>> {
        match self.field(name) {
            Some(_) => self.messages(name).map(Some),
            None => Ok(None),
        }
    }

    fn missing(&self, required: &[&'static str]) -> Vec<&'static str> {
        required
            .iter()
            .copied()
            .filter(|name| self.field(name).is_none())
            .collect()
    }
}

pub fn find(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|command| command.name == name)
}

/// Validates the request against its command entry and runs the handler.
pub async fn dispatch(market: &Marketplace, request: Request) -> Result<Value> {
    let command = find(&request.operation).ok_or_else(|| {
        MarketError::NotFound(format!("unknown operation {}", request.operation))
    })?;
    let params = Params::new(request.params);
    let missing = params.missing(command.required);
    if !missing.is_empty() {
        return Err(MarketError::ValidationError(format!(
            "{} requires {}",
            command.name,
            missing.join(", ")
        )));
    }
    (command.handler)(market, params).await
}

/// Wraps an outcome in the response envelope.
pub fn envelope(outcome: Result<Value>) -> Value {
    match outcome {
        Ok(result) => json!({ "result": result }),
        Err(err) => json!({
            "status": "error",
            "code": err.code(),
            "httpStatus": err.http_status(),
            "description": err.to_string(),
        }),
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn create_user(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let account = market
            .ledger
            .register(params.str("identityKey")?, params.str("name")?)
            .await?;
        to_value(account)
    })
}

fn get_own_profile(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move { to_value(market.ledger.profile(params.str("identityKey")?).await?) })
}

fn get_balance(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        to_value(market.ledger.resting_balance(params.str("identityKey")?).await?)
    })
}

fn create_bot(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let training = params
            .optional_messages("trainingMessages")?
            .unwrap_or_default();
        let bot = market
            .escrow
            .create_bot(
                params.str("identityKey")?,
                params.str("name")?,
                params.optional_str("motto")?.unwrap_or_default(),
                training,
            )
            .await?;
        Ok(json!({ "botID": bot.id }))
    })
}

fn list_own_bots(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move { to_value(market.escrow.own_bots(params.str("identityKey")?).await?) })
}

fn delete_bot(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        market
            .escrow
            .delete_bot(params.str("identityKey")?, params.str("botID")?)
            .await?;
        Ok(Value::Bool(true))
    })
}

fn list_bot(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let listing = market
            .escrow
            .list(
                params.str("identityKey")?,
                params.str("botID")?,
                params.units("amount")?,
            )
            .await?;
        to_value(listing)
    })
}

fn delist_bot(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let listing = market
            .escrow
            .delist(params.str("identityKey")?, params.str("botID")?)
            .await?;
        to_value(listing)
    })
}

fn list_marketplace_bots(market: &Marketplace, _params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move { to_value(market.escrow.listings().await?) })
}

fn get_price_for_bot(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move { to_value(market.escrow.price(params.str("botID")?).await?) })
}

fn buy_bot(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let purchase = market
            .escrow
            .purchase(
                params.str("identityKey")?,
                params.str("botID")?,
                params.units("paymentAmount")?,
                params.optional_messages("trialMessages")?,
            )
            .await?;
        to_value(purchase)
    })
}

fn try_before_buy(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let trial = market
            .escrow
            .try_before_buy(
                params.str("identityKey")?,
                params.str("botID")?,
                params.messages("trialMessages")?,
                params.units("paymentAmount")?,
            )
            .await?;
        to_value(trial)
    })
}

fn create_conversation(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let conversation = market
            .conversations
            .create(
                params.str("identityKey")?,
                params.str("botID")?,
                params.optional_str("title")?.unwrap_or_default(),
            )
            .await?;
        Ok(json!({ "conversationID": conversation.id }))
    })
}

fn list_conversations(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let conversations = market
            .conversations
            .list_with_bot(params.str("identityKey")?, params.str("botID")?)
            .await?;
        to_value(conversations)
    })
}

fn list_conversation_messages(
    market: &Marketplace,
    params: Params,
) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let messages = market
            .conversations
            .messages(
                params.str("identityKey")?,
                params.str("botID")?,
                params.str("conversationID")?,
            )
            .await?;
        to_value(messages)
    })
}

fn send_message(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let reply = market
            .conversations
            .send_message(
                params.str("identityKey")?,
                params.str("botID")?,
                params.str("conversationID")?,
                params.str("message")?,
            )
            .await?;
        Ok(json!({ "reply": reply }))
    })
}

fn cash_out(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        to_value(market.payouts.request_payout(params.str("identityKey")?).await?)
    })
}

fn acknowledge_payment(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let tx = market
            .acknowledgments
            .acknowledge(params.str("identityKey")?, params.str("paymentID")?)
            .await?;
        to_value(tx)
    })
}

fn list_payments(market: &Marketplace, params: Params) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        to_value(market.acknowledgments.history(params.str("identityKey")?).await?)
    })
}
