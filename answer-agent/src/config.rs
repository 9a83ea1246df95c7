//! Configuration for the answer agent.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::prompt::QualityTier;

/// Configuration for an [`AnswerAgent`](crate::AnswerAgent).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// API key; answers are refused with a configuration message when unset
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model used for free and credit answers
    pub standard_model: String,
    /// Model used for subscriber answers
    pub premium_model: String,
    /// Token cap for standard answers
    pub standard_max_tokens: u32,
    /// Token cap for premium answers
    pub premium_max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Retry and timeout policy
    pub retry: RetryConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            standard_model: "gpt-4o-mini".to_string(),
            premium_model: "gpt-4o".to_string(),
            standard_max_tokens: 500,
            premium_max_tokens: 1000,
            temperature: 0.2,
            retry: RetryConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Model name for a quality tier.
    pub fn model_for(&self, tier: QualityTier) -> &str {
        match tier {
            QualityTier::Standard => &self.standard_model,
            QualityTier::Premium => &self.premium_model,
        }
    }

    /// Token cap for a quality tier.
    pub fn max_tokens_for(&self, tier: QualityTier) -> u32 {
        match tier {
            QualityTier::Standard => self.standard_max_tokens,
            QualityTier::Premium => self.premium_max_tokens,
        }
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry (ms); doubles on each further retry
    pub backoff_base_ms: u64,
    /// Per-attempt timeout (ms)
    pub timeout_ms: u64,
    /// Ceiling on any single wait between attempts (ms), server hints included
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 2000,
            timeout_ms: 30_000,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryConfig {
    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff before retry number `retry` (1-based), capped at `max_backoff_ms`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor).min(self.max_backoff_ms))
    }

    /// Wait before retry number `retry`.
    ///
    /// A server-supplied hint can lengthen the wait but never past
    /// `max_backoff_ms`.
    pub fn retry_delay(&self, retry: u32, server_hint_ms: Option<u64>) -> Duration {
        let backoff = self.backoff(retry);
        match server_hint_ms {
            Some(ms) => backoff.max(Duration::from_millis(ms.min(self.max_backoff_ms))),
            None => backoff,
        }
    }
}
