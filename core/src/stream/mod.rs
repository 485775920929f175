//! Streaming types shared by orchestrators and the connector layer.
//!
//! Orchestrators accept an optional `stream_callback` invoked at key transitions so a
//! caller can relay progress to an SSE client (§4.5). Connectors emit a sequence of
//! [`StreamEvent`]s that the `openai_sse` adapter turns into OpenAI-compatible frames.

use std::fmt::Debug;
use std::sync::Arc;

use crate::llm::{LlmUsage, ToolCallDelta};
use crate::message::ToolCallRequest;

/// Progress callback an orchestrator invokes at key transitions (tool started, tool
/// finished, template spliced). Non-blocking by contract: implementations must not
/// perform long-running work synchronously.
#[derive(Clone)]
pub struct ProgressCallback(Arc<dyn Fn(String) + Send + Sync>);

impl ProgressCallback {
    pub fn new(f: impl Fn(String) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, message: impl Into<String>) {
        (self.0)(message.into())
    }
}

impl Debug for ProgressCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressCallback").finish()
    }
}

/// One event emitted by a connector while streaming a completion.
///
/// Consumed by [`crate::openai_sse::StreamToSse`], which turns these into
/// `data: {json}\n\n` frames and a final `data: [DONE]\n\n` terminator.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    /// A chunk of assistant message content.
    ContentDelta(String),
    /// Incremental tool-call arguments (OpenAI-style `tool_calls` streaming delta).
    ToolCallDelta(ToolCallDelta),
    /// The assistant turn finished requesting these tool calls (non-streamed, full turn).
    ToolCallsComplete(Vec<ToolCallRequest>),
    /// Token usage for the completion, when the provider reports it.
    Usage(LlmUsage),
    /// The assistant turn is done; no further content or tool-call deltas follow.
    Done,
}
