//! Orchestration router
//!
//! `Routing -> Dispatching -> Routing -> ... -> Finished`. Each routing step
//! asks the oracle for the next action with every catalog entry bound as a
//! tool. A plain answer finishes the run; tool calls are dispatched as one
//! batch and their results appended before routing again. The run always
//! ends in `Finished`, degraded if the oracle failed or the cycle ceiling
//! was reached.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::prompts::orchestrator_system_prompt;
use crate::agents::SubAgentRunner;
use crate::config::OrchestratorConfig;
use crate::custom_tool::CustomToolRunner;
use crate::llm::{DelegateOracle, Message, OracleRequest, ToolCall};
use crate::session::{CheckpointedRunState, ConversationManager};
use crate::tool::{InvocationSpec, ToolCatalog};
use crate::{Error, Result};

pub(crate) const LOOP_BOUND_ANSWER: &str =
    "I was unable to complete this request within the allowed number of steps. \
     Please try rephrasing or narrowing your question.";

pub(crate) const ORACLE_FAILURE_ANSWER: &str =
    "I'm sorry, I'm having trouble reaching the language model right now. Please try again shortly.";

/// Where the router saves its state after each cycle
#[async_trait]
pub trait CheckpointSink: Send + Sync {
    async fn save(&self, state: &CheckpointedRunState) -> Result<()>;
}

#[async_trait]
impl CheckpointSink for ConversationManager {
    async fn save(&self, state: &CheckpointedRunState) -> Result<()> {
        self.save_checkpoint(state).await
    }
}

/// How a run reached `Finished`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Answered,
    LoopBoundExceeded,
    OracleUnavailable,
}

/// Final state of one router run
#[derive(Debug, Clone)]
pub struct RouterOutcome {
    pub answer: Message,
    pub completion: Completion,
    /// Accumulator and counters as of the last completed cycle
    pub state: CheckpointedRunState,
}

impl RouterOutcome {
    /// Everything the run adds to the thread log, in order
    pub fn turn_messages(&self) -> Vec<Message> {
        let mut messages = self.state.accumulator.clone();
        messages.push(self.answer.clone());
        messages
    }
}

/// Result of one dispatched tool call
struct Dispatched {
    message: Message,
    sources: Vec<String>,
}

/// Executes tool calls against catalog entries
pub struct Dispatcher {
    subagents: SubAgentRunner,
    custom_tools: CustomToolRunner,
}

impl Dispatcher {
    pub fn new(subagents: SubAgentRunner, custom_tools: CustomToolRunner) -> Self {
        Self {
            subagents,
            custom_tools,
        }
    }

    /// Dispatch one call; every failure becomes a tool-result message
    async fn dispatch(
        &self,
        catalog: &ToolCatalog,
        call: &ToolCall,
        history: &[Message],
        user_id: &str,
    ) -> Dispatched {
        let tool_error = |text: String| Dispatched {
            message: Message::tool_result(&call.id, text).with_name(&call.name),
            sources: Vec::new(),
        };

        if !call.arguments.is_object() {
            warn!("Malformed arguments for tool '{}': {}", call.name, call.arguments);
            return tool_error(format!(
                "Error: malformed arguments for tool '{}'; expected {{\"query\": string}}",
                call.name
            ));
        }

        let descriptor = match catalog.resolve(&call.name) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("{}", e);
                return tool_error(format!("Error: unknown tool '{}'. Use one of the available tools.", call.name));
            }
        };

        let query = call.str_arg("query");
        debug!("Dispatching {} ({})", call.name, call.id);

        match &descriptor.invocation {
            InvocationSpec::SubAgent(spec) => {
                let Some(query) = query else {
                    return tool_error(format!("Error: tool '{}' requires a 'query' string argument", call.name));
                };
                match self.subagents.run(spec, query, Some(user_id)).await {
                    Ok(answer) => Dispatched {
                        message: Message::tool_result(&call.id, answer.message.content)
                            .with_name(&spec.agent_name),
                        sources: answer.sources,
                    },
                    Err(e) => {
                        warn!("Sub-agent {} failed: {}", spec.agent_name, e);
                        tool_error(format!("Error: agent '{}' failed: {}", spec.agent_name, e))
                    }
                }
            }
            InvocationSpec::ExternalApi(spec) => {
                let extraction_history = match query {
                    Some(query) => vec![Message::user(query)],
                    None => history.to_vec(),
                };
                let outcome = self
                    .custom_tools
                    .run(&call.id, &call.name, spec, &extraction_history)
                    .await;
                Dispatched {
                    message: outcome.message,
                    sources: Vec::new(),
                }
            }
        }
    }
}

/// Per-run inputs
#[derive(Clone)]
pub struct RunContext {
    pub catalog: Arc<ToolCatalog>,
    /// Persisted thread log, ending with the user's query
    pub log: Arc<Vec<Message>>,
    pub user_id: String,
}

pub struct Router {
    oracle: Arc<dyn DelegateOracle>,
    dispatcher: Arc<Dispatcher>,
    max_cycles: usize,
    max_concurrent_dispatches: usize,
}

impl Router {
    pub fn new(oracle: Arc<dyn DelegateOracle>, dispatcher: Dispatcher, config: &OrchestratorConfig) -> Self {
        Self {
            oracle,
            dispatcher: Arc::new(dispatcher),
            max_cycles: config.max_cycles.max(1),
            max_concurrent_dispatches: config.max_concurrent_dispatches.max(1),
        }
    }

    /// Run until `Finished`, starting from `state`
    ///
    /// `state` is either fresh or a resumed checkpoint. It is handed to
    /// `sink` after every completed cycle. Only sink failures and
    /// non-transport oracle failures are returned as errors.
    pub async fn run(
        &self,
        ctx: &RunContext,
        mut state: CheckpointedRunState,
        sink: &dyn CheckpointSink,
    ) -> Result<RouterOutcome> {
        let system = orchestrator_system_prompt(&ctx.catalog);
        let signatures = ctx.catalog.signatures();

        loop {
            if state.cycles >= self.max_cycles {
                warn!("{}", Error::LoopBoundExceeded(self.max_cycles));
                return Ok(RouterOutcome {
                    answer: Message::assistant(LOOP_BOUND_ANSWER),
                    completion: Completion::LoopBoundExceeded,
                    state,
                });
            }

            // Routing
            let mut history = ctx.log.as_ref().clone();
            history.extend(state.accumulator.iter().cloned());
            let request = OracleRequest::new(history)
                .system(system.clone())
                .tools(signatures.clone());

            let proposal = match self.oracle.propose(&request).await {
                Ok(message) => message,
                Err(Error::OracleTransport(reason)) => {
                    error!("Oracle unavailable, finishing turn: {}", reason);
                    return Ok(RouterOutcome {
                        answer: Message::assistant(ORACLE_FAILURE_ANSWER),
                        completion: Completion::OracleUnavailable,
                        state,
                    });
                }
                Err(e) => return Err(e),
            };

            if !proposal.has_tool_calls() {
                info!("Router finished after {} cycles", state.cycles);
                return Ok(RouterOutcome {
                    answer: proposal,
                    completion: Completion::Answered,
                    state,
                });
            }

            // Dispatching
            let results = self.dispatch_batch(ctx, &proposal.tool_calls, &request.history).await;

            state.accumulator.push(proposal);
            for result in results {
                for source in result.sources {
                    if !state.sources.contains(&source) {
                        state.sources.push(source);
                    }
                }
                state.accumulator.push(result.message);
            }
            state.cycles += 1;
            state.updated_at = chrono::Utc::now();

            sink.save(&state).await?;
        }
    }

    /// Run a batch concurrently; results come back in issue order
    async fn dispatch_batch(&self, ctx: &RunContext, calls: &[ToolCall], history: &[Message]) -> Vec<Dispatched> {
        info!(
            "Dispatching {} tool calls: {}",
            calls.len(),
            calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_dispatches));
        let history = Arc::new(history.to_vec());
        let mut join_set = JoinSet::new();

        for (index, call) in calls.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let dispatcher = self.dispatcher.clone();
            let catalog = ctx.catalog.clone();
            let history = history.clone();
            let user_id = ctx.user_id.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = dispatcher.dispatch(&catalog, &call, &history, &user_id).await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<Dispatched>> = (0..calls.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!("Dispatch task failed: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(calls)
            .map(|(slot, call)| {
                slot.unwrap_or_else(|| Dispatched {
                    message: Message::tool_result(&call.id, format!("Error: tool '{}' did not complete", call.name))
                        .with_name(&call.name),
                    sources: Vec::new(),
                })
            })
            .collect()
    }
}
