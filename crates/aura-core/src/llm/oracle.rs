//! Delegate Oracle capability
//!
//! The router, the sub-agent runner and the parameter extractor only depend
//! on this trait. The real implementation is `LlmClient`; tests use scripted
//! stubs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::types::{Message, ToolSignature};
use crate::{Error, Result};

/// One request for the next action
#[derive(Debug, Clone, Default)]
pub struct OracleRequest {
    pub system: Option<String>,
    pub history: Vec<Message>,
    /// Empty for the non-tool-bound variant
    pub tools: Vec<ToolSignature>,
}

impl OracleRequest {
    pub fn new(history: Vec<Message>) -> Self {
        Self {
            system: None,
            history,
            tools: Vec::new(),
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn tools(mut self, tools: Vec<ToolSignature>) -> Self {
        self.tools = tools;
        self
    }
}

/// Ask a language model for the next structured action
///
/// The returned assistant message either carries tool calls (delegation) or
/// plain content (final answer for this step). Implementations must not
/// mutate anything the caller can observe.
#[async_trait]
pub trait DelegateOracle: Send + Sync {
    async fn propose(&self, request: &OracleRequest) -> Result<Message>;
}

#[async_trait]
impl<T: DelegateOracle + ?Sized> DelegateOracle for Arc<T> {
    async fn propose(&self, request: &OracleRequest) -> Result<Message> {
        (**self).propose(request).await
    }
}

/// Retry policy for oracle calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(60),
            backoff: Duration::from_millis(250),
        }
    }
}

/// Decorator bounding every oracle call in time and attempts
///
/// Retryable failures (transport errors, timeouts) are retried with linear
/// backoff. Once attempts are exhausted the last failure is reported as
/// `Error::OracleTransport`. Non-retryable failures are returned at once.
pub struct RetryingOracle<O> {
    inner: O,
    policy: RetryPolicy,
}

impl<O: DelegateOracle> RetryingOracle<O> {
    pub fn new(inner: O, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<O: DelegateOracle> DelegateOracle for RetryingOracle<O> {
    async fn propose(&self, request: &OracleRequest) -> Result<Message> {
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts.max(1) {
            let outcome = tokio::time::timeout(self.policy.attempt_timeout, self.inner.propose(request)).await;

            let err = match outcome {
                Ok(Ok(message)) => {
                    if attempt > 1 {
                        debug!("Oracle succeeded on attempt {}", attempt);
                    }
                    return Ok(message);
                }
                Ok(Err(e)) if !e.is_retryable() => return Err(e),
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {:?}", self.policy.attempt_timeout),
            };

            warn!(
                "Oracle attempt {}/{} failed: {}",
                attempt, self.policy.max_attempts, err
            );
            last_error = err;

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.backoff * attempt).await;
            }
        }

        Err(Error::OracleTransport(last_error))
    }
}
