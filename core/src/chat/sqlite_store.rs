//! SQLite-backed [`ChatStore`] (§4.8). One table `chats`, with the message history
//! kept as a JSON blob rather than normalized rows: the history tree (parent/children
//! links) is read and written as a unit, never queried column-by-column.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::params;

use crate::chat::{ChatHistory, ChatSession, ChatStore};
use crate::error::LambError;

pub struct SqliteChatStore {
    db_path: std::path::PathBuf,
}

impl SqliteChatStore {
    /// Opens (creating if absent) the database at `path` and ensures the schema exists.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, LambError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path).map_err(to_lamb_error)?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                owner_user_id INTEGER NOT NULL,
                assistant_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                archived INTEGER NOT NULL DEFAULT 0,
                history_json TEXT NOT NULL
            )
            "#,
            [],
        )
        .map_err(to_lamb_error)?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chats_owner_user_id ON chats(owner_user_id)",
            [],
        )
        .map_err(to_lamb_error)?;
        Ok(Self { db_path })
    }
}

fn to_lamb_error(e: rusqlite::Error) -> LambError {
    LambError::Internal(format!("chat store: {e}"))
}

fn row_to_session(
    id: String,
    owner_user_id: i64,
    assistant_id: i64,
    title: String,
    created_at: i64,
    updated_at: i64,
    archived: i64,
    history_json: String,
) -> Result<ChatSession, LambError> {
    let history: ChatHistory =
        serde_json::from_str(&history_json).map_err(|e| LambError::Internal(format!("chat store: corrupt history json: {e}")))?;
    Ok(ChatSession {
        id,
        owner_user_id,
        assistant_id,
        title,
        created_at,
        updated_at,
        archived: archived != 0,
        history,
    })
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn find(&self, chat_id: &str) -> Result<Option<ChatSession>, LambError> {
        let chat_id = chat_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path).map_err(to_lamb_error)?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, owner_user_id, assistant_id, title, created_at, updated_at, archived, history_json \
                     FROM chats WHERE id = ?1",
                )
                .map_err(to_lamb_error)?;
            let mut rows = stmt.query(params![chat_id]).map_err(to_lamb_error)?;
            match rows.next().map_err(to_lamb_error)? {
                Some(row) => {
                    let session = row_to_session(
                        row.get(0).map_err(to_lamb_error)?,
                        row.get(1).map_err(to_lamb_error)?,
                        row.get(2).map_err(to_lamb_error)?,
                        row.get(3).map_err(to_lamb_error)?,
                        row.get(4).map_err(to_lamb_error)?,
                        row.get(5).map_err(to_lamb_error)?,
                        row.get(6).map_err(to_lamb_error)?,
                        row.get(7).map_err(to_lamb_error)?,
                    )?;
                    Ok(Some(session))
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| LambError::Internal(format!("chat store task panicked: {e}")))?
    }

    async fn create(&self, session: ChatSession) -> Result<(), LambError> {
        let db_path = self.db_path.clone();
        let history_json = serde_json::to_string(&session.history).map_err(|e| LambError::Internal(e.to_string()))?;
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path).map_err(to_lamb_error)?;
            conn.execute(
                "INSERT INTO chats (id, owner_user_id, assistant_id, title, created_at, updated_at, archived, history_json) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    session.id,
                    session.owner_user_id,
                    session.assistant_id,
                    session.title,
                    session.created_at,
                    session.updated_at,
                    session.archived as i64,
                    history_json,
                ],
            )
            .map_err(to_lamb_error)?;
            Ok(())
        })
        .await
        .map_err(|e| LambError::Internal(format!("chat store task panicked: {e}")))?
    }

    async fn append_message(&self, chat_id: &str, message: crate::chat::ChatMessageRecord) -> Result<(), LambError> {
        let chat_id = chat_id.to_string();
        let db_path = self.db_path.clone();
        let now = crate::chat::now_epoch_seconds();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path).map_err(to_lamb_error)?;
            let history_json: String = conn
                .query_row("SELECT history_json FROM chats WHERE id = ?1", params![chat_id], |row| row.get(0))
                .map_err(to_lamb_error)?;
            let mut history: ChatHistory =
                serde_json::from_str(&history_json).map_err(|e| LambError::Internal(format!("chat store: corrupt history json: {e}")))?;
            history.messages.insert(message.id.clone(), message);
            let history_json = serde_json::to_string(&history).map_err(|e| LambError::Internal(e.to_string()))?;
            conn.execute(
                "UPDATE chats SET history_json = ?1, updated_at = ?2 WHERE id = ?3",
                params![history_json, now, chat_id],
            )
            .map_err(to_lamb_error)?;
            Ok(())
        })
        .await
        .map_err(|e| LambError::Internal(format!("chat store task panicked: {e}")))?
    }
}
