//! aura-core: multi-agent orchestration core
//!
//! Routes a user's request through specialized sub-agents and
//! user-registered HTTP APIs, and keeps per-thread conversation state
//! durable and resumable.
//!
//! # Modules
//!
//! - [`llm`]: the `DelegateOracle` capability, its HTTP client for Claude and
//!   OpenAI-compatible APIs, and the retrying decorator
//! - [`tool`]: tool descriptors, the SQLite tool registry and the per-turn
//!   catalog
//! - [`custom_tool`]: parameter extraction and the HTTP call for
//!   user-registered APIs
//! - [`agents`]: compiled-in sub-agents and their runner
//! - [`retrieval`]: the document search boundary used by sub-agents
//! - [`orchestrator`]: the routing loop and the `run_turn` entry point
//! - [`session`]: threads, messages and checkpoints in SQLite
//!
//! # Example
//!
//! ```no_run
//! # async fn demo(turns: aura_core::TurnRunner) -> aura_core::Result<()> {
//! let outcome = turns.run_turn(None, "alice", "What is the leak penalty?").await?;
//! println!("{} (thread {})", outcome.answer_text, outcome.thread_id);
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod config;
pub mod custom_tool;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod retrieval;
pub mod session;
pub mod tool;

#[cfg(test)]
mod testing;

pub use agents::{SubAgentRunner, SubAgentSpec, builtin_subagents, reserved_tool_names};
pub use config::{Config, LlmConfig, LlmProvider, OracleRole};
pub use custom_tool::CustomToolRunner;
pub use error::{Error, Result};
pub use llm::{DelegateOracle, LlmClient, Message, RetryPolicy, RetryingOracle};
pub use orchestrator::{Dispatcher, Router, TurnOutcome, TurnRunner, TurnStatus};
pub use retrieval::{HttpRetriever, NoopRetriever, Retriever};
pub use session::{ConversationManager, ConversationThread};
pub use tool::{CustomToolDefinition, SqliteToolRegistry, ToolCatalog, ToolRegistry};
