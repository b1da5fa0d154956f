//! Ledger and settlement engine for a chatbot marketplace.
//!
//! Users hold internal balances, list bots for sale, buy them or pay for a
//! single trial reply, chat with the bots they own, and cash out through
//! externally built payments that must be acknowledged before the next one is
//! issued.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
