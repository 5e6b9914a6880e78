//! Delegate Oracle: LLM API client and conversation types
//!
//! Supports both Claude API and OpenAI-compatible APIs (OpenRouter, etc.)

mod client;
mod oracle;
mod types;

pub use client::LlmClient;
pub use oracle::{DelegateOracle, OracleRequest, RetryPolicy, RetryingOracle};
pub use types::*;
