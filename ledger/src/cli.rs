//! Command-line and environment configuration for the `answer-ledger` binary.
//!
//! Knobs left unset keep the value from `CONFIG_FILE`, or the built-in
//! default when no file is given.

use std::path::{Path, PathBuf};

use clap::Parser;

use answer_agent::AgentConfig;

use crate::config::LedgerConfig;
use crate::types::{LedgerError, Result, UserId};

#[derive(Parser, Debug, Clone)]
#[command(name = "answer-ledger")]
#[command(about = "Entitlement and quota ledger for a metered AI answering bot")]
pub struct Args {
    /// SQLite database path
    #[arg(long, env = "DB_PATH", default_value = "bot.db")]
    pub db_path: PathBuf,

    /// Optional YAML file with ledger settings
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Free answers per day
    #[arg(long, env = "FREE_LIMIT")]
    pub free_limit: Option<u32>,

    /// Daily fair-use cap for subscribers
    #[arg(long, env = "PREMIUM_FAIRUSE_DAILY")]
    pub premium_fairuse_daily: Option<u32>,

    /// Credits per pack
    #[arg(long, env = "PRO_PACK_SIZE")]
    pub pro_pack_size: Option<u64>,

    /// Days per subscription purchase
    #[arg(long, env = "PREMIUM_DAYS")]
    pub premium_days: Option<u32>,

    /// Minimum request interval for non-subscribers (ms)
    #[arg(long, env = "COOLDOWN_FREE_MS")]
    pub cooldown_free_ms: Option<u64>,

    /// Minimum request interval for subscribers (ms)
    #[arg(long, env = "COOLDOWN_PREMIUM_MS")]
    pub cooldown_premium_ms: Option<u64>,

    /// Credits per referred friend
    #[arg(long, env = "REF_BONUS_PER_FRIEND")]
    pub ref_bonus_per_friend: Option<u64>,

    /// Maximum rewarded referrals per user
    #[arg(long, env = "REF_MAX_FRIENDS")]
    pub ref_max_friends: Option<u32>,

    /// Credit pack price in USD
    #[arg(long, env = "PRO_PRICE_USD")]
    pub pro_price_usd: Option<f64>,

    /// Subscription price in USD
    #[arg(long, env = "PREMIUM_PRICE_USD")]
    pub premium_price_usd: Option<f64>,

    /// API key for the OpenAI-compatible backend
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible backend
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    /// Model for free and credit answers
    #[arg(long, env = "FREE_MODEL")]
    pub free_model: Option<String>,

    /// Model for subscriber answers
    #[arg(long, env = "PREMIUM_MODEL")]
    pub premium_model: Option<String>,

    /// User allowed to read stats; 0 disables
    #[arg(long, env = "ADMIN_USER_ID", default_value = "0")]
    pub admin_user_id: i64,

    /// Bot username used in referral links
    #[arg(long, env = "BOT_USERNAME")]
    pub bot_username: Option<String>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Print the effective ledger settings as YAML and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Args {
    /// Ledger settings: file (if any), then flag/env overrides, validated.
    pub fn ledger_config(&self) -> Result<LedgerConfig> {
        let mut config = match &self.config_file {
            Some(path) => load_config_file(path)?,
            None => LedgerConfig::default(),
        };

        if let Some(v) = self.free_limit {
            config.free_daily_limit = v;
        }
        if let Some(v) = self.premium_fairuse_daily {
            config.fair_use_daily_cap = v;
        }
        if let Some(v) = self.pro_pack_size {
            config.credit_pack_size = v;
        }
        if let Some(v) = self.premium_days {
            config.subscription_days = v;
        }
        if let Some(v) = self.cooldown_free_ms {
            config.free_interval_ms = v;
        }
        if let Some(v) = self.cooldown_premium_ms {
            config.premium_interval_ms = v;
        }
        if let Some(v) = self.ref_bonus_per_friend {
            config.referral_bonus = v;
        }
        if let Some(v) = self.ref_max_friends {
            config.max_referrals = v;
        }
        if let Some(v) = self.pro_price_usd {
            config.credit_pack_price_usd = v;
        }
        if let Some(v) = self.premium_price_usd {
            config.subscription_price_usd = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn agent_config(&self) -> AgentConfig {
        let mut config = AgentConfig {
            api_key: self.openai_api_key.clone().filter(|k| !k.trim().is_empty()),
            ..Default::default()
        };
        if let Some(url) = &self.openai_base_url {
            config.base_url = url.clone();
        }
        if let Some(model) = &self.free_model {
            config.standard_model = model.clone();
        }
        if let Some(model) = &self.premium_model {
            config.premium_model = model.clone();
        }
        config
    }

    pub fn admin_id(&self) -> Option<UserId> {
        (self.admin_user_id != 0).then_some(UserId(self.admin_user_id))
    }
}

fn load_config_file(path: &Path) -> Result<LedgerConfig> {
    let yaml = std::fs::read_to_string(path)
        .map_err(|e| LedgerError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    LedgerConfig::from_yaml(&yaml)
        .map_err(|e| LedgerError::Config(format!("Failed to parse {}: {}", path.display(), e)))
}
