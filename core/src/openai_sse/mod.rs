//! OpenAI-compatible Chat Completions SSE adapter (§6.1).
//!
//! Converts [`StreamEvent`](crate::stream::StreamEvent) into SSE lines in the format
//! of [OpenAI streaming](https://platform.openai.com/docs/api-reference/chat-streaming).
//! No HTTP dependency: callers feed events and consume SSE lines (or bytes).
//!
//! # Types
//!
//! - **[`ChatCompletionRequest`]**: request body DTO (model, messages, stream, chat_id).
//! - **[`ChatCompletionResponse`]**: non-streaming response object, plus `sources`.
//! - **[`ChatCompletionChunk`]**: one streaming chunk (id, object, created, model, choices).
//! - **[`StreamToSse`]**: stateful adapter that turns connector [`StreamEvent`]s into SSE lines.
//!
//! The streaming path never makes a second provider call to detect tool calls: the
//! connector buffers deltas from the single streaming call and this adapter forwards
//! them as they arrive (§4.7 Redesign Flag resolution).

mod chunk;
mod request;

pub use chunk::{ChatCompletionChunk, ChatCompletionResponse, Choice, ChoiceMessage, ChunkChoice, Delta, DeltaToolCall, DeltaToolCallFunction};
pub use request::ChatCompletionRequest;

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use crate::kb_client::Source;
use crate::stream::StreamEvent;

/// Metadata shared by every chunk in one stream (same id, created, model).
#[derive(Debug, Clone)]
pub struct ChunkMeta {
    /// Completion id (e.g. `"chatcmpl-xxx"`).
    pub id: String,
    pub model: String,
    /// Unix timestamp (seconds). Resolved lazily from the system clock at the first
    /// chunk if unset, so every chunk in a stream shares one `created` value.
    pub created: Option<u64>,
}

impl ChunkMeta {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created: None,
        }
    }

    fn created_secs(&mut self) -> u64 {
        if let Some(c) = self.created {
            c
        } else {
            let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
            self.created = Some(secs);
            secs
        }
    }
}

/// Converts a connector's [`StreamEvent`] sequence into OpenAI SSE lines.
///
/// Feed events via [`feed`](StreamToSse::feed), call [`finish`](StreamToSse::finish)
/// once the stream ends, then drain with [`take_lines`](StreamToSse::take_lines).
/// Constructing with [`new_with_sink`](StreamToSse::new_with_sink) also forwards each
/// line to a channel as it is produced, for a response body that reads from the
/// receiver end while the connector is still streaming.
pub struct StreamToSse {
    meta: ChunkMeta,
    include_usage: bool,
    usage: Option<crate::llm::LlmUsage>,
    lines: Vec<String>,
    sent_role: bool,
    saw_tool_calls: bool,
    sink: Option<mpsc::Sender<String>>,
}

impl StreamToSse {
    pub fn new(meta: ChunkMeta, include_usage: bool) -> Self {
        Self {
            meta,
            include_usage,
            usage: None,
            lines: Vec::new(),
            sent_role: false,
            saw_tool_calls: false,
            sink: None,
        }
    }

    pub fn new_with_sink(meta: ChunkMeta, include_usage: bool, sink: mpsc::Sender<String>) -> Self {
        Self {
            meta,
            include_usage,
            usage: None,
            lines: Vec::new(),
            sent_role: false,
            saw_tool_calls: false,
            sink: Some(sink),
        }
    }

    fn push_line(&mut self, line: String) {
        if let Some(ref tx) = self.sink {
            let _ = tx.try_send(line.clone());
        }
        self.lines.push(line);
    }

    fn push_chunk(&mut self, created: u64, delta: Delta, finish_reason: Option<String>) {
        let chunk = ChatCompletionChunk {
            id: self.meta.id.clone(),
            object: ChatCompletionChunk::OBJECT,
            created,
            model: self.meta.model.clone(),
            choices: vec![ChunkChoice { index: 0, delta, finish_reason }],
            usage: None,
        };
        self.push_line(write_sse_line(&chunk));
    }

    /// Emits the leading `data: {"sources": [...]}\n\n` frame before the first content
    /// chunk, when the orchestration produced any (§6.1). A no-op for an empty list.
    pub fn push_sources(&mut self, sources: &[Source]) {
        if sources.is_empty() {
            return;
        }
        self.push_line(format!("data: {}\n\n", serde_json::json!({ "sources": sources })));
    }

    /// Emits an out-of-band error frame ahead of the terminal chunk, for a connector
    /// stream that breaks off early (upstream disconnect, provider 5xx mid-stream).
    /// `finish()` still runs afterward so the stream keeps its single `[DONE]`
    /// terminator (§8 invariant 7); without this frame a client sees a normal
    /// `finish_reason: "stop"` and cannot tell truncated content from a complete answer.
    pub fn push_error(&mut self, message: &str) {
        self.push_line(format!(
            "data: {}\n\n",
            serde_json::json!({ "error": { "message": message, "type": "upstream_error" } })
        ));
    }

    /// Feeds one connector stream event, producing zero or more SSE lines.
    pub fn feed(&mut self, event: StreamEvent) {
        let created = self.meta.created_secs();
        match event {
            StreamEvent::ContentDelta(text) => {
                let role = self.take_initial_role();
                self.push_chunk(created, Delta { role, content: Some(text), tool_calls: None }, None);
            }
            StreamEvent::ToolCallDelta(delta) => {
                self.saw_tool_calls = true;
                let role = self.take_initial_role();
                let tool_call = DeltaToolCall {
                    index: delta.index,
                    id: delta.id,
                    r#type: Some("function".to_string()),
                    function: Some(DeltaToolCallFunction {
                        name: delta.name,
                        arguments: Some(delta.arguments_delta),
                    }),
                };
                self.push_chunk(
                    created,
                    Delta {
                        role,
                        content: None,
                        tool_calls: Some(vec![tool_call]),
                    },
                    None,
                );
            }
            // The full tool-call list is consumed by the connector's own bounded loop
            // (§4.7); the adapter only needs it to pick the right finish_reason below.
            StreamEvent::ToolCallsComplete(_) => {
                self.saw_tool_calls = true;
            }
            StreamEvent::Usage(usage) => {
                self.usage = Some(usage);
            }
            StreamEvent::Done => {}
        }
    }

    fn take_initial_role(&mut self) -> Option<String> {
        if self.sent_role {
            None
        } else {
            self.sent_role = true;
            Some("assistant".to_string())
        }
    }

    /// Emits the terminal chunk (`finish_reason: "stop"` or `"tool_calls"`, optional
    /// usage) followed by `data: [DONE]\n\n`. Call once after the stream ends.
    pub fn finish(&mut self) {
        let created = self.meta.created_secs();
        let finish_reason = if self.saw_tool_calls { "tool_calls" } else { "stop" };
        let chunk = ChatCompletionChunk {
            id: self.meta.id.clone(),
            object: ChatCompletionChunk::OBJECT,
            created,
            model: self.meta.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta::default(),
                finish_reason: Some(finish_reason.to_string()),
            }],
            usage: if self.include_usage { self.usage.clone() } else { None },
        };
        self.push_line(write_sse_line(&chunk));
        self.push_line("data: [DONE]\n\n".to_string());
    }

    /// Returns and clears the collected SSE lines.
    pub fn take_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

/// Serializes a [`ChatCompletionChunk`] to a single SSE line: `data: <JSON>\n\n`.
pub fn write_sse_line(chunk: &ChatCompletionChunk) -> String {
    let json = serde_json::to_string(chunk).expect("chunk serialization is infallible");
    format!("data: {json}\n\n")
}
