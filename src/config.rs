use crate::domain::money::{Share, Units};
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Tunable marketplace economics and cash-out parameters.
///
/// Every field has a default, so a config file only needs to name what it
/// overrides.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketConfig {
    pub sale_seller_share: Share,
    pub sale_creator_share: Share,
    pub trial_seller_share: Share,
    pub trial_creator_share: Share,
    /// Withheld from refunds of failed or raced purchase and trial attempts.
    pub handling_fee: Units,
    pub minimum_ask_price: Units,
    pub minimum_payout: Units,
    /// Account credited with the platform residual. When unset the residual
    /// stays off-ledger.
    pub platform_account: Option<String>,
    /// The platform's static key handed to the key-derivation service.
    pub platform_key: String,
    pub invoice_protocol: String,
    pub max_nonce_attempts: u8,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            sale_seller_share: Share::percent(80),
            sale_creator_share: Share::percent(5),
            trial_seller_share: Share::percent(50),
            trial_creator_share: Share::percent(5),
            handling_fee: Units::new(100),
            minimum_ask_price: Units::new(1000),
            minimum_payout: Units::new(1000),
            platform_account: None,
            platform_key: String::new(),
            invoice_protocol: "2-3241645161d8".to_string(),
            max_nonce_attempts: 8,
        }
    }
}

impl fmt::Debug for MarketConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketConfig")
            .field("sale_seller_share", &self.sale_seller_share)
            .field("sale_creator_share", &self.sale_creator_share)
            .field("trial_seller_share", &self.trial_seller_share)
            .field("trial_creator_share", &self.trial_creator_share)
            .field("handling_fee", &self.handling_fee)
            .field("minimum_ask_price", &self.minimum_ask_price)
            .field("minimum_payout", &self.minimum_payout)
            .field("platform_account", &self.platform_account)
            .field("platform_key", &"<redacted>")
            .field("invoice_protocol", &self.invoice_protocol)
            .field("max_nonce_attempts", &self.max_nonce_attempts)
            .finish()
    }
}

impl MarketConfig {
    /// Reads a JSON config file. Missing fields fall back to defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        Ok(config)
    }

    pub fn with_platform_key(mut self, platform_key: impl Into<String>) -> Self {
        self.platform_key = platform_key.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, seller, creator) in [
            ("sale", self.sale_seller_share, self.sale_creator_share),
            ("trial", self.trial_seller_share, self.trial_creator_share),
        ] {
            if seller.value() + creator.value() > Decimal::ONE {
                return Err(MarketError::ValidationError(format!(
                    "The {} seller and creator shares add up to more than the payment",
                    name
                )));
            }
        }
        if self.platform_key.trim().is_empty() {
            return Err(MarketError::ValidationError(
                "A platform key is required".to_string(),
            ));
        }
        if self.minimum_payout.is_zero() {
            return Err(MarketError::ValidationError(
                "minimumPayout must be positive".to_string(),
            ));
        }
        if self.max_nonce_attempts == 0 {
            return Err(MarketError::ValidationError(
                "maxNonceAttempts must be at least 1".to_string(),
            ));
        }
        if let Some(account) = &self.platform_account
            && account.trim().is_empty()
        {
            return Err(MarketError::ValidationError(
                "platformAccount must not be empty when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_need_a_platform_key() {
        assert!(MarketConfig::default().validate().is_err());
        assert!(
            MarketConfig::default()
                .with_platform_key("server-key")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"handlingFee": 250, "saleSellerShare": "0.70", "platformKey": "k"}}"#
        )
        .unwrap();

        let config = MarketConfig::from_path(file.path()).unwrap();
        assert_eq!(config.handling_fee, Units::new(250));
        assert_eq!(config.sale_seller_share.value(), dec!(0.70));
        assert_eq!(config.sale_creator_share.value(), dec!(0.05));
        assert_eq!(config.minimum_payout, Units::new(1000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overcommitted_shares_rejected() {
        let mut config = MarketConfig::default().with_platform_key("k");
        config.trial_seller_share = Share::new(dec!(0.99)).unwrap();
        assert!(matches!(
            config.validate(),
            Err(MarketError::ValidationError(_))
        ));
    }

    #[test]
    fn test_debug_redacts_platform_key() {
        let config = MarketConfig::default().with_platform_key("top-secret");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("top-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
