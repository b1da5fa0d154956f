use crate::domain::money::Units;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not authorized: {0}")]
    Unauthorized(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Bot {bot_id} is no longer for sale, {refunded} units were refunded")]
    AlreadySold { bot_id: String, refunded: Units },
    #[error("Payment {0} has already been acknowledged")]
    AlreadyAcknowledged(String),
    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: Units, required: Units },
    #[error("Collaborator error: {0}")]
    CollaboratorError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, MarketError>;

impl MarketError {
    /// Stable machine-readable code carried in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::ValidationError(_) => "ERR_VALIDATION",
            MarketError::NotFound(_) => "ERR_NOT_FOUND",
            MarketError::Unauthorized(_) => "ERR_UNAUTHORIZED",
            MarketError::Conflict(_) | MarketError::AlreadySold { .. } => "ERR_CONFLICT",
            MarketError::AlreadyAcknowledged(_) => "ERR_ALREADY_ACKNOWLEDGED",
            MarketError::InsufficientBalance { .. } => "ERR_INSUFFICIENT_BALANCE",
            MarketError::CollaboratorError(_) => "ERR_COLLABORATOR",
            _ => "ERR_INTERNAL",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            MarketError::ValidationError(_) | MarketError::InsufficientBalance { .. } => 400,
            MarketError::Unauthorized(_) => 403,
            MarketError::NotFound(_) => 404,
            MarketError::Conflict(_)
            | MarketError::AlreadySold { .. }
            | MarketError::AlreadyAcknowledged(_) => 409,
            MarketError::CollaboratorError(_) => 502,
            _ => 500,
        }
    }
}
