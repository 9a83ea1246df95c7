//! Answer Agent - AI answer generation for the answer ledger
//!
//! Provides the collaborator that turns an admitted question into text:
//! - Trait-based LLM backends (OpenAI-compatible, mock)
//! - Per-tier model selection (standard vs premium quality)
//! - Bounded retries with exponential backoff and per-attempt timeouts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              AnswerAgent                │
//! │   (retry / timeout / tier selection)    │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌─────────────┐       ┌─────────────┐
//! │ standard    │       │ premium     │
//! │ LlmBackend  │       │ LlmBackend  │
//! └─────────────┘       └─────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod prompt;
pub mod service;

pub use backend::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};
pub use config::{AgentConfig, RetryConfig};
pub use prompt::{user_prompt, QualityTier};
pub use service::{AgentError, Answer, AnswerAgent};
