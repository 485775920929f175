//! Legacy single-slot prompt processors (§4.6): used when an assistant names a
//! `prompt_processor` directly in its metadata and declares no tool graph.
//!
//! Unlike an orchestrator, a prompt processor fills exactly two tokens —
//! `{user_input}` and `{context}` — and does not run a tool graph itself; `context`
//! is supplied by a legacy `rag_processor` call the caller makes beforehand (§4.3).

mod moodle_augment;

pub use moodle_augment::{LmsUserLookup, MoodleAugmentProcessor};

use async_trait::async_trait;

use crate::assistant::Assistant;
use crate::message::Message;
use crate::tool::ToolRequest;

/// A plugin that builds the final message list from the conversation, the assistant's
/// template, and whatever RAG context the caller already resolved (§4.3
/// "prompt_processor(request, assistant, rag_context) -> messages[]").
#[async_trait]
pub trait PromptProcessor: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, request: &ToolRequest, assistant: &Assistant, rag_context: &str) -> Vec<Message>;
}

/// Replaces `{user_input}` and `{context}` in `assistant.prompt_template`, prepends
/// the system prompt, and preserves prior messages untouched (§4.6).
pub(crate) fn splice_legacy_template(assistant: &Assistant, history: &[Message], user_input: &str, rag_context: &str) -> Vec<Message> {
    let filled = assistant
        .prompt_template
        .replace("{context}", rag_context)
        .replace("{user_input}", user_input);

    let mut out = Vec::with_capacity(history.len() + 2);
    if !assistant.system_prompt.is_empty() {
        out.push(Message::system(assistant.system_prompt.clone()));
    }
    out.extend(history.iter().cloned());
    out.push(Message::user(filled));
    out
}

/// The plain legacy processor: no identity resolution, just template splicing.
pub struct LegacyPromptProcessor;

#[async_trait]
impl PromptProcessor for LegacyPromptProcessor {
    fn name(&self) -> &str {
        "legacy"
    }

    async fn process(&self, request: &ToolRequest, assistant: &Assistant, rag_context: &str) -> Vec<Message> {
        let history = if request.messages.is_empty() {
            &[][..]
        } else {
            &request.messages[..request.messages.len() - 1]
        };
        let user_input = request.messages.last().map(|m| m.content.as_text()).unwrap_or_default();
        splice_legacy_template(assistant, history, &user_input, rag_context)
    }
}
