//! Conversation persistence using SQLite

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use tracing::debug;

use super::types::{CheckpointedRunState, ConversationThread, MessageRecord};
use crate::llm::Message;
use crate::{Error, Result};

/// SQLite-based conversation store
///
/// `messages` is append-only: rows are inserted and removed only with their
/// thread, never updated.
pub struct ConversationStore {
    conn: Connection,
}

fn parse_time(value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn row_to_thread(row: &Row<'_>) -> rusqlite::Result<ConversationThread> {
    Ok(ConversationThread {
        thread_id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_time(&row.get::<_, String>(3)?)?,
        updated_at: parse_time(&row.get::<_, String>(4)?)?,
    })
}

impl ConversationStore {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::with_connection(Connection::open(db_path)?)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self { conn };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS threads (
                thread_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_threads_user_id ON threads(user_id);
            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id TEXT NOT NULL REFERENCES threads(thread_id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_thread_id ON messages(thread_id, seq);
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT PRIMARY KEY REFERENCES threads(thread_id) ON DELETE CASCADE,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn get_thread(&self, thread_id: &str) -> Result<Option<ConversationThread>> {
        let thread = self
            .conn
            .query_row(
                "SELECT thread_id, user_id, title, created_at, updated_at FROM threads WHERE thread_id = ?1",
                params![thread_id],
                row_to_thread,
            )
            .optional()?;
        Ok(thread)
    }

    /// Load a thread, creating it with `seed_title` if it does not exist
    pub fn get_or_create_thread(&self, thread_id: &str, user_id: &str, seed_title: &str) -> Result<ConversationThread> {
        if let Some(thread) = self.get_thread(thread_id)? {
            return Ok(thread);
        }

        let thread = ConversationThread::new(thread_id, user_id, seed_title);
        self.conn.execute(
            "INSERT INTO threads (thread_id, user_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                thread.thread_id,
                thread.user_id,
                thread.title,
                thread.created_at.to_rfc3339()
            ],
        )?;
        debug!("Created thread {} for user {}", thread_id, user_id);
        Ok(thread)
    }

    /// Threads owned by `user_id`, most recently updated first
    pub fn list_threads(&self, user_id: &str) -> Result<Vec<ConversationThread>> {
        let mut stmt = self.conn.prepare(
            "SELECT thread_id, user_id, title, created_at, updated_at FROM threads
             WHERE user_id = ?1 ORDER BY updated_at DESC, rowid DESC",
        )?;
        let threads = stmt.query_map(params![user_id], row_to_thread)?;

        let mut result = Vec::new();
        for thread in threads {
            result.push(thread?);
        }
        Ok(result)
    }

    fn insert_message(tx: &Transaction<'_>, thread_id: &str, message: &Message, now: &str) -> Result<()> {
        let body = serde_json::to_string(message)?;
        tx.execute(
            "INSERT INTO messages (thread_id, role, body, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![thread_id, message.role.as_str(), body, now],
        )?;
        Ok(())
    }

    fn touch_thread(tx: &Transaction<'_>, thread_id: &str, now: &str) -> Result<()> {
        let updated = tx.execute(
            "UPDATE threads SET updated_at = ?2 WHERE thread_id = ?1",
            params![thread_id, now],
        )?;
        if updated == 0 {
            return Err(Error::ThreadNotFound(thread_id.to_string()));
        }
        Ok(())
    }

    /// Append one message and refresh `updated_at`, atomically
    pub fn append_message(&self, thread_id: &str, message: &Message) -> Result<()> {
        self.append_messages(thread_id, std::slice::from_ref(message))
    }

    /// Append messages in order and refresh `updated_at`, atomically
    pub fn append_messages(&self, thread_id: &str, messages: &[Message]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        Self::touch_thread(&tx, thread_id, &now)?;
        for message in messages {
            Self::insert_message(&tx, thread_id, message, &now)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Messages with their sequence numbers, oldest first
    pub fn list_message_records(&self, thread_id: &str) -> Result<Vec<MessageRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, body, created_at FROM messages WHERE thread_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![thread_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (seq, body, created_at) = row?;
            let message: Message = serde_json::from_str(&body)
                .map_err(|e| Error::Persistence(format!("corrupt message {}: {}", seq, e)))?;
            records.push(MessageRecord {
                seq,
                created_at: parse_time(&created_at)?,
                message,
            });
        }
        Ok(records)
    }

    /// Messages oldest first
    pub fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .list_message_records(thread_id)?
            .into_iter()
            .map(|r| r.message)
            .collect())
    }

    pub fn load_checkpoint(&self, thread_id: &str) -> Result<Option<CheckpointedRunState>> {
        let state = self
            .conn
            .query_row(
                "SELECT state FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        state
            .map(|json| {
                serde_json::from_str(&json)
                    .map_err(|e| Error::Persistence(format!("corrupt checkpoint for {}: {}", thread_id, e)))
            })
            .transpose()
    }

    /// Replace the thread's checkpoint in a single statement
    pub fn save_checkpoint(&self, state: &CheckpointedRunState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoints (thread_id, state, updated_at) VALUES (?1, ?2, ?3)",
            params![state.thread_id, json, state.updated_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Start a turn: persist the user's message and the initial checkpoint together
    pub fn begin_turn(&self, user_message: &Message, state: &CheckpointedRunState) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let json = serde_json::to_string(state)?;
        let tx = self.conn.unchecked_transaction()?;
        Self::touch_thread(&tx, &state.thread_id, &now)?;
        Self::insert_message(&tx, &state.thread_id, user_message, &now)?;
        tx.execute(
            "INSERT OR REPLACE INTO checkpoints (thread_id, state, updated_at) VALUES (?1, ?2, ?3)",
            params![state.thread_id, json, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Finish a turn: append its messages and drop the checkpoint together
    pub fn commit_turn(&self, thread_id: &str, messages: &[Message]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        Self::touch_thread(&tx, thread_id, &now)?;
        for message in messages {
            Self::insert_message(&tx, thread_id, message, &now)?;
        }
        tx.execute("DELETE FROM checkpoints WHERE thread_id = ?1", params![thread_id])?;
        tx.commit()?;
        Ok(())
    }

    /// Delete a thread with its messages and checkpoint; returns whether it existed
    pub fn delete_thread(&self, thread_id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM threads WHERE thread_id = ?1", params![thread_id])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Role, ToolCall};
    use serde_json::json;
    use tempfile::TempDir;

    fn store_with_thread() -> ConversationStore {
        let store = ConversationStore::in_memory().unwrap();
        store.get_or_create_thread("t1", "u1", "Leak penalties").unwrap();
        store
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = ConversationStore::in_memory().unwrap();
        let first = store.get_or_create_thread("t1", "u1", "First").unwrap();
        let second = store.get_or_create_thread("t1", "u1", "Second").unwrap();

        assert_eq!(first.thread_id, second.thread_id);
        assert_eq!(second.title, "First");
    }

    #[test]
    fn test_append_preserves_order_and_content() {
        let store = store_with_thread();
        let call = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("c1", "ask_industrial_agent", json!({"query": "leak"}))],
        );
        store.append_message("t1", &Message::user("leak penalty?")).unwrap();
        store
            .append_messages("t1", &[call.clone(), Message::tool_result("c1", "$10,000")])
            .unwrap();

        let records = store.list_message_records("t1").unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.windows(2).all(|w| w[0].seq < w[1].seq));
        assert!(records.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert_eq!(records[1].message, call);
        assert_eq!(records[2].message.role, Role::Tool);
    }

    #[test]
    fn test_append_refreshes_updated_at() {
        let store = store_with_thread();
        let before = store.get_thread("t1").unwrap().unwrap().updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));

        store.append_message("t1", &Message::user("hi")).unwrap();
        let after = store.get_thread("t1").unwrap().unwrap().updated_at;
        assert!(after > before);
    }

    #[test]
    fn test_append_to_unknown_thread_fails_without_writing() {
        let store = ConversationStore::in_memory().unwrap();
        let err = store.append_message("ghost", &Message::user("hi")).unwrap_err();

        assert!(matches!(err, Error::ThreadNotFound(_)));
        assert!(store.list_messages("ghost").unwrap().is_empty());
    }

    #[test]
    fn test_checkpoint_roundtrip_and_commit() {
        let store = store_with_thread();
        store.append_message("t1", &Message::user("leak penalty?")).unwrap();

        let mut state = CheckpointedRunState::new("t1", "u1", "leak penalty?");
        state.cycles = 1;
        state.accumulator.push(Message::assistant("partial"));
        store.save_checkpoint(&state).unwrap();
        assert_eq!(store.load_checkpoint("t1").unwrap(), Some(state.clone()));

        let mut turn = state.accumulator.clone();
        turn.push(Message::assistant("final"));
        store.commit_turn("t1", &turn).unwrap();

        assert!(store.load_checkpoint("t1").unwrap().is_none());
        assert_eq!(store.list_messages("t1").unwrap().len(), 3);
    }

    #[test]
    fn test_begin_turn_writes_message_and_checkpoint() {
        let store = store_with_thread();
        let state = CheckpointedRunState::new("t1", "u1", "leak penalty?");

        store.begin_turn(&Message::user("leak penalty?"), &state).unwrap();

        assert_eq!(store.list_messages("t1").unwrap(), vec![Message::user("leak penalty?")]);
        assert_eq!(store.load_checkpoint("t1").unwrap().unwrap().query, "leak penalty?");
    }

    #[test]
    fn test_list_threads_newest_first() {
        let store = ConversationStore::in_memory().unwrap();
        store.get_or_create_thread("old", "u1", "Old").unwrap();
        store.get_or_create_thread("other", "u2", "Other").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.get_or_create_thread("new", "u1", "New").unwrap();

        let ids: Vec<_> = store
            .list_threads("u1")
            .unwrap()
            .into_iter()
            .map(|t| t.thread_id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_delete_cascades() {
        let store = store_with_thread();
        store.append_message("t1", &Message::user("hi")).unwrap();
        store
            .save_checkpoint(&CheckpointedRunState::new("t1", "u1", "hi"))
            .unwrap();

        assert!(store.delete_thread("t1").unwrap());
        assert!(store.list_messages("t1").unwrap().is_empty());
        assert!(store.load_checkpoint("t1").unwrap().is_none());
        assert!(!store.delete_thread("t1").unwrap());
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("aura.db");
        let path = path.to_str().unwrap();

        {
            let store = ConversationStore::new(path).unwrap();
            store.get_or_create_thread("t1", "u1", "Persisted").unwrap();
            store.append_message("t1", &Message::user("remember me")).unwrap();
        }

        let reopened = ConversationStore::new(path).unwrap();
        assert_eq!(reopened.list_messages("t1").unwrap()[0].content, "remember me");
    }
}
