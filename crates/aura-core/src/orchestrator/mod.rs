//! Orchestration
//!
//! ```text
//! run_turn ─► ConversationManager (lock thread, persist query)
//!                │
//!                ▼
//!             Router ──► DelegateOracle
//!                │
//!                ├──► SubAgentRunner ──► Retriever
//!                └──► CustomToolRunner ──► external HTTP API
//!                │
//!                ▼
//!          ConversationManager (checkpoint per cycle, commit at Finished)
//! ```

pub mod prompts;
pub mod router;
pub mod turn;

pub use router::{CheckpointSink, Completion, Dispatcher, Router, RouterOutcome, RunContext};
pub use turn::{TurnOutcome, TurnRunner, TurnStatus};
