//! Conversation state and checkpoint store
//!
//! Durable, thread-scoped message logs plus the resumable state of an
//! in-flight turn. All writes go through `ConversationManager`.

mod manager;
mod store;
mod types;

pub use manager::ConversationManager;
pub use store::ConversationStore;
pub use types::{CheckpointedRunState, ConversationThread, MessageRecord, seed_title};
