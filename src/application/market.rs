use crate::application::acknowledgment::TransactionAcknowledgment;
use crate::application::conversations::BotConversations;
use crate::application::escrow::MarketplaceEscrow;
use crate::application::ledger::AccountLedger;
use crate::application::payout::PayoutCoordinator;
use crate::config::MarketConfig;
use crate::domain::ports::{Collaborators, MarketStoreRef};
use crate::error::Result;
use std::sync::Arc;
use tracing::info;

const PLATFORM_DISPLAY_NAME: &str = "Platform";

/// The main entry point for the marketplace backend.
///
/// Owns one store and the injected collaborators, and hands each component
/// the pieces it needs. Cloning is cheap; every clone shares the same store.
#[derive(Clone)]
pub struct Marketplace {
    pub ledger: AccountLedger,
    pub escrow: MarketplaceEscrow,
    pub payouts: PayoutCoordinator,
    pub acknowledgments: TransactionAcknowledgment,
    pub conversations: BotConversations,
    config: Arc<MarketConfig>,
}

impl Marketplace {
    /// Validates the config, wires the components and registers the platform
    /// account if one is configured.
    pub async fn open(
        store: MarketStoreRef,
        config: MarketConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let ledger = AccountLedger::new(store.clone());
        let escrow = MarketplaceEscrow::new(
            store.clone(),
            ledger.clone(),
            config.clone(),
            collaborators.responder.clone(),
        );
        let conversations =
            BotConversations::new(store.clone(), ledger.clone(), collaborators.responder);
        let payouts = PayoutCoordinator::new(
            store.clone(),
            config.clone(),
            collaborators.key_deriver,
            collaborators.payment_builder,
        );
        let acknowledgments = TransactionAcknowledgment::new(store);

        if let Some(platform) = &config.platform_account {
            ledger.ensure_account(platform, PLATFORM_DISPLAY_NAME).await?;
            info!(platform_account = %platform, "platform account ready");
        }

        Ok(Self {
            ledger,
            escrow,
            payouts,
            acknowledgments,
            conversations,
            config,
        })
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }
}
