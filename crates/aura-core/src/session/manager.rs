//! Conversation manager: the single writer of conversation state

use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::store::ConversationStore;
use super::types::{CheckpointedRunState, ConversationThread, MessageRecord};
use crate::llm::Message;
use crate::{Error, Result};

/// Async facade over `ConversationStore`
///
/// Turns on the same thread are serialized through `lock_thread`: a second
/// caller waits (FIFO) until the first one releases the guard. Distinct
/// threads never contend on these locks.
pub struct ConversationManager {
    store: Arc<Mutex<ConversationStore>>,
    thread_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl ConversationManager {
    /// Create a new manager with a database path
    pub fn new(db_path: &str) -> Result<Self> {
        Ok(Self::with_store(ConversationStore::new(db_path)?))
    }

    /// Create an in-memory manager (for testing)
    pub fn in_memory() -> Result<Self> {
        Ok(Self::with_store(ConversationStore::in_memory()?))
    }

    pub fn with_store(store: ConversationStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            thread_locks: DashMap::new(),
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, ConversationStore>> {
        self.store
            .lock()
            .map_err(|_| Error::Persistence("conversation store lock poisoned".to_string()))
    }

    /// Wait for exclusive use of `thread_id`
    pub async fn lock_thread(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .thread_locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        debug!("Waiting for thread lock: {}", thread_id);
        lock.lock_owned().await
    }

    pub async fn get_or_create_thread(&self, thread_id: &str, user_id: &str, seed_title: &str) -> Result<ConversationThread> {
        self.store()?.get_or_create_thread(thread_id, user_id, seed_title)
    }

    pub async fn get_thread(&self, thread_id: &str) -> Result<Option<ConversationThread>> {
        self.store()?.get_thread(thread_id)
    }

    pub async fn list_threads(&self, user_id: &str) -> Result<Vec<ConversationThread>> {
        self.store()?.list_threads(user_id)
    }

    pub async fn append_message(&self, thread_id: &str, message: &Message) -> Result<()> {
        self.store()?.append_message(thread_id, message)
    }

    pub async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        self.store()?.list_messages(thread_id)
    }

    pub async fn list_message_records(&self, thread_id: &str) -> Result<Vec<MessageRecord>> {
        self.store()?.list_message_records(thread_id)
    }

    pub async fn load_checkpoint(&self, thread_id: &str) -> Result<Option<CheckpointedRunState>> {
        self.store()?.load_checkpoint(thread_id)
    }

    pub async fn save_checkpoint(&self, state: &CheckpointedRunState) -> Result<()> {
        self.store()?.save_checkpoint(state)?;
        debug!(
            "Checkpoint saved for thread {} after {} cycles",
            state.thread_id, state.cycles
        );
        Ok(())
    }

    /// Persist the user's message before any oracle call sees it
    pub async fn begin_turn(&self, user_message: &Message, state: &CheckpointedRunState) -> Result<()> {
        self.store()?.begin_turn(user_message, state)?;
        debug!("Turn started on thread {}", state.thread_id);
        Ok(())
    }

    pub async fn commit_turn(&self, thread_id: &str, messages: &[Message]) -> Result<()> {
        self.store()?.commit_turn(thread_id, messages)?;
        info!("Committed {} messages to thread {}", messages.len(), thread_id);
        Ok(())
    }

    /// Delete a thread, its messages and checkpoint
    pub async fn delete_thread(&self, thread_id: &str) -> Result<bool> {
        let _guard = self.lock_thread(thread_id).await;
        let existed = self.store()?.delete_thread(thread_id)?;
        if existed {
            info!("Deleted thread: {}", thread_id);
        }
        Ok(existed)
    }
}
