//! AnswerAgent - produces answers for admitted requests.
//!
//! Picks the backend for the request's quality tier and drives it under a
//! bounded retry/timeout policy. Callers invoke it outside any ledger lock.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::traits::{CompletionResponse, LlmBackend, LlmError};
use crate::backend::OpenAiBackend;
use crate::config::AgentConfig;
use crate::prompt::{completion_request, QualityTier};

/// Shown when the backend is not configured.
pub const NOT_CONFIGURED_MESSAGE: &str = "OpenAI key is not set. Add OPENAI_API_KEY in your .env.";

/// Shown when every attempt failed.
pub const TRANSIENT_FAILURE_MESSAGE: &str =
    "AI is overloaded or network error. Please try again in a minute.";

/// Error types for the agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Backend cannot serve requests at all
    #[error("Answer backend not configured: {0}")]
    NotConfigured(String),

    /// Transient failures persisted through every attempt
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: LlmError },

    /// Non-retryable backend failure
    #[error("Backend error: {0}")]
    Backend(LlmError),
}

impl AgentError {
    /// Message suitable for the requester.
    pub fn user_message(&self) -> &'static str {
        match self {
            AgentError::NotConfigured(_) => NOT_CONFIGURED_MESSAGE,
            AgentError::Exhausted { .. } | AgentError::Backend(_) => TRANSIENT_FAILURE_MESSAGE,
        }
    }
}

/// A produced answer.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Generated text
    pub text: String,
    /// Model that produced it
    pub model: String,
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// Raw completion
    pub completion: CompletionResponse,
}

/// Produces answers with per-tier backends.
pub struct AnswerAgent {
    config: AgentConfig,
    standard: Arc<dyn LlmBackend>,
    premium: Arc<dyn LlmBackend>,
}

impl AnswerAgent {
    /// Create an agent from explicit backends.
    pub fn new(
        config: AgentConfig,
        standard: Arc<dyn LlmBackend>,
        premium: Arc<dyn LlmBackend>,
    ) -> Self {
        Self {
            config,
            standard,
            premium,
        }
    }

    /// Create an agent backed by the OpenAI-compatible API in `config`.
    pub fn from_config(config: AgentConfig) -> Result<Self, AgentError> {
        let timeout = config.retry.timeout();
        let build = |model: &str| {
            OpenAiBackend::new(&config.base_url, model, config.api_key.clone(), timeout)
                .map_err(|e| AgentError::NotConfigured(e.to_string()))
        };
        let standard = Arc::new(build(config.model_for(QualityTier::Standard))?);
        let premium = Arc::new(build(config.model_for(QualityTier::Premium))?);

        if !standard.has_api_key() {
            warn!("No API key configured - answers will be refused");
        }

        Ok(Self::new(config, standard, premium))
    }

    /// Get the configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn backend_for(&self, tier: QualityTier) -> &Arc<dyn LlmBackend> {
        match tier {
            QualityTier::Standard => &self.standard,
            QualityTier::Premium => &self.premium,
        }
    }

    /// Answer a prepared prompt.
    pub async fn answer(&self, tier: QualityTier, prompt: &str) -> Result<Answer, AgentError> {
        let backend = self.backend_for(tier);
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = completion_request(&self.config, tier, prompt);

            debug!(model = backend.id(), attempt, "Requesting completion");

            let result = match tokio::time::timeout(retry.timeout(), backend.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(retry.timeout_ms)),
            };

            match result {
                Ok(completion) => {
                    info!(
                        model = backend.id(),
                        attempt,
                        tokens = completion.usage.total(),
                        "Answer generated"
                    );
                    return Ok(Answer {
                        text: completion.content.clone(),
                        model: backend.id().to_string(),
                        attempts: attempt,
                        completion,
                    });
                }
                Err(LlmError::Unavailable(reason)) => {
                    return Err(AgentError::NotConfigured(reason));
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let hint = match &e {
                        LlmError::RateLimited { retry_after_ms } => *retry_after_ms,
                        _ => None,
                    };
                    let delay = retry.retry_delay(attempt, hint);
                    warn!(
                        model = backend.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient backend failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    warn!(model = backend.id(), attempt, error = %e, "Retries exhausted");
                    return Err(AgentError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    warn!(model = backend.id(), error = %e, "Backend request failed");
                    return Err(AgentError::Backend(e));
                }
            }
        }
    }
}
