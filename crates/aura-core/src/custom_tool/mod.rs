//! Custom-tool invocation pipeline
//!
//! `ExtractingParameters -> Invoking -> Done | Failed`. Extraction asks the
//! oracle for schema-conformant parameters; invocation turns them into one
//! authenticated HTTP request. Each stage fails on its own, and either way
//! the caller gets a tool-result message so the conversation can go on.

mod extraction;
mod invoker;
mod request;

pub use extraction::{ExtractedParameters, ParameterExtractor, strip_code_fences, validate_parameters};
pub use invoker::HttpInvoker;
pub use request::{HttpMethod, PreparedRequest, build_request};

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::llm::{DelegateOracle, Message};
use crate::tool::ExternalApiSpec;
use crate::{Error, Result};

/// Pipeline states
#[derive(Debug)]
pub enum CustomToolState {
    ExtractingParameters,
    Invoking(ExtractedParameters),
    Done { api_response: JsonValue },
    Failed(Error),
}

impl CustomToolState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed(_))
    }
}

/// Result of one custom-tool dispatch
#[derive(Debug)]
pub struct CustomToolOutcome {
    /// `Done` or `Failed`
    pub state: CustomToolState,
    /// Tool-result message answering the originating tool call
    pub message: Message,
}

impl CustomToolOutcome {
    pub fn api_response(&self) -> Option<&JsonValue> {
        match &self.state {
            CustomToolState::Done { api_response } => Some(api_response),
            _ => None,
        }
    }
}

/// Runs the two-stage pipeline for external-api catalog entries
#[derive(Clone)]
pub struct CustomToolRunner {
    extractor: ParameterExtractor,
    invoker: HttpInvoker,
}

impl CustomToolRunner {
    pub fn new(oracle: Arc<dyn DelegateOracle>, http_timeout: Duration) -> Result<Self> {
        Ok(Self {
            extractor: ParameterExtractor::new(oracle),
            invoker: HttpInvoker::new(http_timeout)?,
        })
    }

    async fn step(&self, state: CustomToolState, spec: &ExternalApiSpec, history: &[Message]) -> CustomToolState {
        match state {
            CustomToolState::ExtractingParameters => match self.extractor.extract(spec, history).await {
                Ok(params) => CustomToolState::Invoking(params),
                Err(e) => CustomToolState::Failed(e),
            },
            CustomToolState::Invoking(params) => {
                let outcome = match build_request(spec, &params) {
                    Ok(request) => self.invoker.send(&request).await,
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(api_response) => CustomToolState::Done { api_response },
                    Err(e) => CustomToolState::Failed(e),
                }
            }
            terminal => terminal,
        }
    }

    /// Drive the pipeline to a terminal state
    ///
    /// `history` is what the extraction stage sees. Failures never escape:
    /// they are reported in the returned tool-result message.
    pub async fn run(
        &self,
        tool_call_id: &str,
        tool_name: &str,
        spec: &ExternalApiSpec,
        history: &[Message],
    ) -> CustomToolOutcome {
        let mut state = CustomToolState::ExtractingParameters;
        while !state.is_terminal() {
            state = self.step(state, spec, history).await;
        }

        let content = match &state {
            CustomToolState::Failed(e) => {
                warn!("Custom tool '{}' failed: {}", tool_name, e);
                failure_text(tool_name, e)
            }
            CustomToolState::Done { api_response } => {
                info!("Custom tool '{}' completed", tool_name);
                api_response.to_string()
            }
            CustomToolState::ExtractingParameters | CustomToolState::Invoking(_) => String::new(),
        };

        CustomToolOutcome {
            state,
            message: Message::tool_result(tool_call_id, content).with_name(tool_name),
        }
    }
}

fn failure_text(tool_name: &str, error: &Error) -> String {
    match error {
        Error::ParameterExtraction(reason) => {
            format!("Error: could not extract parameters for tool '{}': {}", tool_name, reason)
        }
        Error::ExternalApi { status, body } => {
            format!("Error calling API '{}': status {}: {}", tool_name, status, body)
        }
        other => format!("Error calling API '{}': {}", tool_name, other),
    }
}
