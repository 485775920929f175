//! Internal chat persistence hook (§4.8, §3 "Internal chat session").
//!
//! Writes happen after orchestration succeeds and the connector has returned (or, in
//! streaming mode, after the terminal frame is emitted). A chat is created lazily on
//! the first turn if the client doesn't pass an existing id; idempotency is keyed by
//! that client-supplied id, never invented server-side once a client has one.

mod sqlite_store;

pub use sqlite_store::SqliteChatStore;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assistant::Assistant;
use crate::auth::AuthContext;
use crate::error::LambError;
use crate::message::Message;

/// One turn in a chat's history, keyed by id in [`ChatHistory::messages`] — the OWI
/// shape (§3: "history.messages is a mapping from message id to {...}").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageRecord {
    pub id: String,
    pub role: String,
    pub content: String,
    pub timestamp: i64,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatHistory {
    pub messages: HashMap<String, ChatMessageRecord>,
}

impl ChatHistory {
    /// Messages in display order: ascending by timestamp, ties broken by id so the
    /// order is deterministic; records with no timestamp sort first (§4.8 step 4).
    pub fn ordered_messages(&self) -> Vec<&ChatMessageRecord> {
        let mut out: Vec<&ChatMessageRecord> = self.messages.values().collect();
        out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        out
    }

    fn last_message_id(&self) -> Option<String> {
        self.ordered_messages().last().map(|m| m.id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub owner_user_id: i64,
    pub assistant_id: i64,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub history: ChatHistory,
}

/// Persistence for internal chat sessions, backed by [`SqliteChatStore`] in
/// production or [`InMemoryChatStore`] for tests and local dev without a database.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn find(&self, chat_id: &str) -> Result<Option<ChatSession>, LambError>;
    async fn create(&self, session: ChatSession) -> Result<(), LambError>;
    async fn append_message(&self, chat_id: &str, message: ChatMessageRecord) -> Result<(), LambError>;
}

/// In-memory [`ChatStore`] for tests and local dev.
#[derive(Default)]
pub struct InMemoryChatStore {
    sessions: Mutex<HashMap<String, ChatSession>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn find(&self, chat_id: &str) -> Result<Option<ChatSession>, LambError> {
        Ok(self.sessions.lock().unwrap().get(chat_id).cloned())
    }

    async fn create(&self, session: ChatSession) -> Result<(), LambError> {
        self.sessions.lock().unwrap().insert(session.id.clone(), session);
        Ok(())
    }

    async fn append_message(&self, chat_id: &str, message: ChatMessageRecord) -> Result<(), LambError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(chat_id)
            .ok_or_else(|| LambError::NotFound(format!("chat {chat_id}")))?;
        session.history.messages.insert(message.id.clone(), message);
        session.updated_at = now_epoch_seconds();
        Ok(())
    }
}

pub(crate) fn now_epoch_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Truncates `text` to roughly 50 characters for an auto-generated chat title,
/// falling back to a timestamped default for empty input (§4.8 step 2).
fn auto_title(first_user_message: &str, now: i64) -> String {
    let trimmed = first_user_message.trim();
    if trimmed.is_empty() {
        return format!("New Chat {now}");
    }
    let truncated: String = trimmed.chars().take(50).collect();
    if trimmed.chars().count() > 50 {
        format!("{truncated}…")
    } else {
        truncated
    }
}

/// Runs the full persistence hook for one turn (§4.8): validates or creates the chat,
/// then appends the user and assistant messages in order. Returns the chat id (newly
/// generated, or the caller's own, echoed back so the client can keep using it).
///
/// Ownership check (step 1): the authenticated user must either own the chat, or
/// have access to the assistant it belongs to — anything else fails `NotFound` rather
/// than `PermissionDenied`, so existence cannot be inferred (§4.1, §7). Once access is
/// established, a `chat_id` that names a chat created under a *different* assistant is
/// a genuine conflict (`Conflict`, 409) rather than an access question (§6.1, §7).
pub async fn persist_turn(
    store: &dyn ChatStore,
    auth: &AuthContext,
    assistant: &Assistant,
    chat_id: Option<String>,
    user_message: &Message,
    assistant_message: &Message,
) -> Result<String, LambError> {
    let now = now_epoch_seconds();

    let chat_id = match chat_id {
        Some(id) => {
            let existing = store
                .find(&id)
                .await?
                .ok_or_else(|| LambError::NotFound(format!("chat {id}")))?;
            let owns_chat = existing.owner_user_id == auth.user.id;
            if !owns_chat && !auth.can_access_assistant(assistant) {
                return Err(LambError::NotFound(format!("chat {id}")));
            }
            if existing.assistant_id != assistant.id {
                return Err(LambError::Conflict(format!(
                    "chat {id} belongs to assistant {}, not {}",
                    existing.assistant_id, assistant.id
                )));
            }
            id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            let title = auto_title(&user_message.content.as_text(), now);
            store
                .create(ChatSession {
                    id: id.clone(),
                    owner_user_id: auth.user.id,
                    assistant_id: assistant.id,
                    title,
                    created_at: now,
                    updated_at: now,
                    archived: false,
                    history: ChatHistory::default(),
                })
                .await?;
            id
        }
    };

    let existing = store.find(&chat_id).await?.ok_or_else(|| LambError::NotFound(format!("chat {chat_id}")))?;
    let parent_id = existing.history.last_message_id();

    let user_record = ChatMessageRecord {
        id: Uuid::new_v4().to_string(),
        role: user_message.role.clone(),
        content: user_message.content.as_text(),
        timestamp: now,
        parent_id,
        children_ids: Vec::new(),
    };
    let user_id = user_record.id.clone();
    store.append_message(&chat_id, user_record).await?;

    let assistant_record = ChatMessageRecord {
        id: Uuid::new_v4().to_string(),
        role: assistant_message.role.clone(),
        content: assistant_message.content.as_text(),
        timestamp: now_epoch_seconds(),
        parent_id: Some(user_id),
        children_ids: Vec::new(),
    };
    store.append_message(&chat_id, assistant_record).await?;

    Ok(chat_id)
}
