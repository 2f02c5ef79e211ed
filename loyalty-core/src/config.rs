//! Configuration for the loyalty ledger

use crate::types::{RewardEntry, Tier};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Actor mailbox capacity (backpressure bound)
    pub mailbox_capacity: usize,

    /// Tier assigned at registration
    pub default_tier: Tier,

    /// Points and bonus constants
    pub rewards: RewardsConfig,

    /// Seed reward catalog
    pub catalog: Vec<RewardEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "loyalty-core".to_string(),
            mailbox_capacity: 1000,
            default_tier: Tier::Bronze,
            rewards: RewardsConfig::default(),
            catalog: vec![RewardEntry {
                id: "r1".to_string(),
                name: "10 USDC Voucher".to_string(),
                points: 100,
                stock: 5,
                tier_required: Tier::Bronze,
            }],
        }
    }
}

/// Points and bonus constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    /// Points granted once at registration
    pub register_points: u64,

    /// Points per deposited unit
    pub deposit_points_per_unit: u64,

    /// Fixed part of the proof bonus
    pub proof_base_points: u64,

    /// Lower bound of the proof bonus random component (inclusive)
    pub proof_random_min: u64,

    /// Upper bound of the proof bonus random component (inclusive)
    pub proof_random_max: u64,

    /// Balance credited to a referrer per referred registration
    pub referral_bonus: Decimal,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            register_points: 5,
            deposit_points_per_unit: 10,
            proof_base_points: 15,
            proof_random_min: 1,
            proof_random_max: 1000,
            referral_bonus: Decimal::from(10),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(capacity) = std::env::var("LOYALTY_MAILBOX_CAPACITY") {
            config.mailbox_capacity = capacity
                .parse()
                .map_err(|e| crate::Error::Config(format!("LOYALTY_MAILBOX_CAPACITY: {}", e)))?;
        }

        if let Ok(bonus) = std::env::var("LOYALTY_REFERRAL_BONUS") {
            config.rewards.referral_bonus = bonus
                .parse()
                .map_err(|e| crate::Error::Config(format!("LOYALTY_REFERRAL_BONUS: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency
    pub fn validate(&self) -> crate::Result<()> {
        if self.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity must be positive".to_string(),
            ));
        }

        if self.rewards.proof_random_min > self.rewards.proof_random_max {
            return Err(crate::Error::Config(format!(
                "proof random range is empty: [{}, {}]",
                self.rewards.proof_random_min, self.rewards.proof_random_max
            )));
        }

        if self.rewards.referral_bonus.is_sign_negative() {
            return Err(crate::Error::Config(
                "referral_bonus cannot be negative".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "loyalty-core");
        assert_eq!(config.rewards.register_points, 5);
        assert_eq!(config.rewards.deposit_points_per_unit, 10);
        assert_eq!(config.rewards.proof_base_points, 15);
        assert_eq!(config.catalog.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
mailbox_capacity = 64

[rewards]
proof_base_points = 20
referral_bonus = "2.5"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.mailbox_capacity, 64);
        assert_eq!(config.rewards.proof_base_points, 20);
        assert_eq!(config.rewards.referral_bonus, Decimal::new(25, 1));
        // Untouched fields keep their defaults
        assert_eq!(config.rewards.register_points, 5);
        assert_eq!(config.catalog[0].id, "r1");
    }

    #[test]
    fn test_invalid_random_range() {
        let mut config = Config::default();
        config.rewards.proof_random_min = 10;
        config.rewards.proof_random_max = 5;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }
}
