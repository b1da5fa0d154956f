//! Application layer orchestrating the marketplace's money movements.
//!
//! `AccountLedger` owns balances, `MarketplaceEscrow` settles listings and
//! trials through it, `PayoutCoordinator` turns balances into external
//! payments and `TransactionAcknowledgment` closes those payments out.
//! `BotConversations` lets owners chat with the bots they hold.
//! `Marketplace` wires them all to one store.

pub mod acknowledgment;
pub mod conversations;
pub mod escrow;
pub mod ledger;
pub mod market;
pub mod payout;
