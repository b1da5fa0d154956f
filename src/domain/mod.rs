//! Domain entities, value objects and the ports the application layer
//! depends on.

pub mod account;
pub mod bot;
pub mod conversation;
pub mod listing;
pub mod money;
pub mod payout;
pub mod ports;
