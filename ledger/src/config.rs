//! Configuration for the ledger.

use serde::{Deserialize, Serialize};

use crate::types::{LedgerError, Result};

/// Seconds in a subscription day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Entitlement knobs. Defaults match the production bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Free answers per calendar day
    pub free_daily_limit: u32,
    /// Daily answers still granted to an active subscriber
    pub fair_use_daily_cap: u32,
    /// Credits added by one credit pack
    pub credit_pack_size: u64,
    /// Days added by one subscription purchase
    pub subscription_days: u32,
    /// Minimum interval between answer requests for non-subscribers (ms)
    pub free_interval_ms: u64,
    /// Minimum interval between answer requests for subscribers (ms)
    pub premium_interval_ms: u64,
    /// Credits granted to the inviter per referral
    pub referral_bonus: u64,
    /// Maximum referrals credited per inviter
    pub max_referrals: u32,
    /// Credit pack list price
    pub credit_pack_price_usd: f64,
    /// Subscription list price
    pub subscription_price_usd: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            free_daily_limit: 10,
            fair_use_daily_cap: 300,
            credit_pack_size: 100,
            subscription_days: 30,
            free_interval_ms: 2000,
            premium_interval_ms: 500,
            referral_bonus: 2,
            max_referrals: 500,
            credit_pack_price_usd: 2.50,
            subscription_price_usd: 7.00,
        }
    }
}

impl LedgerConfig {
    /// Load config from YAML. Missing keys keep their defaults.
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Subscription length in seconds.
    pub fn subscription_secs(&self) -> i64 {
        i64::from(self.subscription_days) * SECONDS_PER_DAY
    }

    /// Check the knobs are usable.
    pub fn validate(&self) -> Result<()> {
        if self.subscription_days == 0 {
            return Err(LedgerError::Config("subscription_days must be positive".into()));
        }
        if self.credit_pack_size == 0 {
            return Err(LedgerError::Config("credit_pack_size must be positive".into()));
        }
        if self.premium_interval_ms > self.free_interval_ms {
            return Err(LedgerError::Config(format!(
                "premium_interval_ms ({}) must not exceed free_interval_ms ({})",
                self.premium_interval_ms, self.free_interval_ms
            )));
        }
        for (name, price) in [
            ("credit_pack_price_usd", self.credit_pack_price_usd),
            ("subscription_price_usd", self.subscription_price_usd),
        ] {
            if !price.is_finite() || price < 0.0 {
                return Err(LedgerError::Config(format!("{} must be a non-negative amount", name)));
            }
        }
        Ok(())
    }
}
