//! Conversation state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::Message;

const TITLE_MAX_CHARS: usize = 50;
const DEFAULT_TITLE: &str = "New Chat";

/// A persisted, user-owned conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationThread {
    pub thread_id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Refreshed with every appended message
    pub updated_at: DateTime<Utc>,
}

impl ConversationThread {
    pub fn new(thread_id: impl Into<String>, user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            title: title.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Title for a new thread: the first query, cut to 50 characters
pub fn seed_title(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    trimmed.chars().take(TITLE_MAX_CHARS).collect()
}

/// Message as stored, with its position in the thread
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    /// Strictly increasing within the store
    pub seq: i64,
    pub created_at: DateTime<Utc>,
    pub message: Message,
}

/// In-flight turn state, saved after every routing/dispatching cycle
///
/// The user's query is already in the message log when the first
/// checkpoint is written; `accumulator` holds only what the turn added
/// since.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointedRunState {
    pub thread_id: String,
    pub user_id: String,
    pub query: String,
    pub accumulator: Vec<Message>,
    /// Completed routing/dispatching cycles
    pub cycles: usize,
    #[serde(default)]
    pub sources: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointedRunState {
    pub fn new(thread_id: impl Into<String>, user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            query: query.into(),
            accumulator: Vec::new(),
            cycles: 0,
            sources: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}
