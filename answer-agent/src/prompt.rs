//! Prompt assembly for answer requests.

use serde::{Deserialize, Serialize};

use crate::backend::traits::CompletionRequest;
use crate::config::AgentConfig;

/// System prompt sent with every answer.
pub const SYSTEM_PROMPT: &str = "You are a crypto Q&A assistant. Be concise, no financial advice. \
Always add: 'This is not financial advice.'";

/// Preamble prepended to the user's question.
pub const GUARD_PREAMBLE: &str = "IMPORTANT: You must not provide financial advice. \
Add 'This is not financial advice.' and suggest doing own research.";

/// Model quality an answer is produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Free allotment and one-time credits
    Standard,
    /// Active subscribers
    Premium,
}

/// Build the user-facing prompt for a question.
pub fn user_prompt(question: &str) -> String {
    format!("{}\n\nUser question:\n{}", GUARD_PREAMBLE, question.trim())
}

/// Build the completion request for a prepared prompt.
pub fn completion_request(config: &AgentConfig, tier: QualityTier, prompt: &str) -> CompletionRequest {
    CompletionRequest::user(prompt)
        .with_system(SYSTEM_PROMPT)
        .with_max_tokens(config.max_tokens_for(tier))
        .with_temperature(config.temperature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prompt_wraps_question() {
        let prompt = user_prompt("  Is ETH proof of stake?  ");
        assert!(prompt.starts_with(GUARD_PREAMBLE));
        assert!(prompt.ends_with("User question:\nIs ETH proof of stake?"));
    }

    #[test]
    fn test_completion_request_uses_tier_limits() {
        let config = AgentConfig::default();
        let request = completion_request(&config, QualityTier::Premium, "q");
        assert_eq!(request.max_tokens, Some(1000));
        assert_eq!(request.system_prompt.as_deref(), Some(SYSTEM_PROMPT));
        assert_eq!(request.temperature, Some(0.2));
    }
}
