//! Wire-level request DTO for `POST /v1/chat/completions` (§6.1).
//!
//! Reuses [`crate::message::Message`] directly rather than a parallel type: the
//! request and the internal pipeline speak the same message shape end to end.

use serde::Deserialize;

use crate::message::Message;

/// Request body for the completion endpoint. `model` is either the canonical
/// `"lamb_assistant.<id>"` form or a bare assistant id (§6.1, REDESIGN FLAG §9(c)).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// LMS identifiers and other caller-supplied context consulted by identity-aware
    /// prompt processors (§4.6).
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Existing chat to append to; omitted on the first turn of a new conversation
    /// (§4.8 step 1).
    #[serde(default)]
    pub chat_id: Option<String>,
    /// End-user identity headers an upstream gateway (e.g. Open WebUI) forwards for
    /// LTI-backed tools (§3, §4.6).
    #[serde(default, rename = "__openwebui_headers__")]
    pub openwebui_headers: serde_json::Value,
}

impl ChatCompletionRequest {
    /// Assistant id parsed out of `model`, accepting both the canonical
    /// `"lamb_assistant.<id>"` form and a bare integer (§6.1, §9(c)).
    pub fn assistant_id(&self) -> Result<i64, String> {
        let raw = self.model.strip_prefix("lamb_assistant.").unwrap_or(&self.model);
        raw.parse::<i64>().map_err(|_| format!("model field does not name an assistant: {}", self.model))
    }

    /// Canonical `model` form to echo back in responses regardless of which form the
    /// client sent (§9(c): "the server always echoes the canonical form back").
    pub fn canonical_model(assistant_id: i64) -> String {
        format!("lamb_assistant.{assistant_id}")
    }
}
