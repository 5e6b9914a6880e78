//! Sub-agents
//!
//! A sub-agent is a narrow responder with its own system prompt and at most
//! one retrieval tool. The orchestrator reaches each one through a single
//! oracle-visible tool (`ask_<area>_agent`) and gets back exactly one
//! attributed answer message.

pub mod builtin;
pub mod runner;
pub mod types;

pub use builtin::{builtin_subagents, reserved_tool_names};
pub use runner::SubAgentRunner;
pub use types::{RETRIEVAL_TOOL_NAME, RetrievalBinding, SubAgentAnswer, SubAgentSpec};
