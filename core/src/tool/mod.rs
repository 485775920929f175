//! The `Tool` trait and its built-in implementations (§4.4).
//!
//! A tool plugin fills one `{placeholder}` in an assistant's `prompt_template`.
//! Tools are stateless between calls, must tolerate missing optional fields, and must
//! return a single [`ToolResult`] rather than crash: a failed lookup still yields a
//! result, with `error` set and `content` possibly empty.

mod context_aware_rag;
mod mcp_tool;
mod simple_rag;

pub use context_aware_rag::ContextAwareRagTool;
pub use mcp_tool::McpTool;
pub use simple_rag::SimpleRagTool;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::assistant::{Assistant, ToolConfig};
use crate::kb_client::Source;
use crate::message::Message;

/// The request context visible to a tool: the conversation plus the sequential
/// orchestrator's accumulated state (§4.5 "augmented request").
#[derive(Debug, Clone, Default)]
pub struct ToolRequest {
    pub messages: Vec<Message>,
    /// Arbitrary caller metadata (e.g. `__openwebui_headers__`, LTI fields) consulted
    /// by identity-aware processors.
    pub metadata: serde_json::Value,
    /// Set by the sequential orchestrator to the template as filled by earlier tools.
    pub current_context: Option<String>,
    /// Set by the sequential orchestrator: every [`ToolResult`] produced so far.
    pub accumulated_results: Vec<ToolResult>,
}

impl ToolRequest {
    /// The text of the last message (joining text parts when content is a mixed
    /// list), the default retrieval query for tools that need one.
    pub fn last_user_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_text())
            .unwrap_or_default()
    }
}

/// The declaration a tool registers with, shown to assistant authors when wiring a
/// tool graph (§4.3 "tool_processor ... plus a declaration").
#[derive(Debug, Clone, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub display_name: String,
    pub category: String,
    pub config_schema: serde_json::Value,
}

/// The outcome of one tool invocation (§3 "ToolResult").
#[derive(Debug, Clone, Default)]
pub struct ToolResult {
    pub placeholder: String,
    pub content: String,
    pub sources: Vec<Source>,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(placeholder: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            content: content.into(),
            sources: Vec::new(),
            error: None,
        }
    }

    pub fn ok_with_sources(placeholder: impl Into<String>, content: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            placeholder: placeholder.into(),
            content: content.into(),
            sources,
            error: None,
        }
    }

    pub fn failed(placeholder: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            content: String::new(),
            sources: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// A single tool plugin, registered under a unique name and invoked by an
/// orchestrator (§4.3, §4.4).
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, matched against [`ToolConfig::tool_name`].
    fn name(&self) -> &str;

    fn declaration(&self) -> ToolDeclaration;

    /// Runs the tool. MUST NOT panic: validation and execution failures are reported
    /// via [`ToolResult::error`], not a `Result::Err`.
    async fn tool_processor(&self, request: &ToolRequest, assistant: &Assistant, tool_config: &ToolConfig) -> ToolResult;

    /// Per-call timeout (§4.4: "suggested default 30s for RAG, longer for transcript
    /// ingestion").
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

/// Calls `tool` with timeout enforcement. A timeout produces a [`ToolResult`] with
/// `error` set rather than propagating, matching every other tool failure mode so the
/// orchestrator's handling is uniform (§4.4, §4.5 "log and drop").
pub async fn call_with_timeout(tool: &dyn Tool, request: &ToolRequest, assistant: &Assistant, tool_config: &ToolConfig) -> ToolResult {
    match tokio::time::timeout(tool.timeout(), tool.tool_processor(request, assistant, tool_config)).await {
        Ok(result) => result,
        Err(_) => ToolResult::failed(
            tool_config.placeholder.clone(),
            format!("tool {} timed out after {:?}", tool.name(), tool.timeout()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{Assistant, AssistantMetadata};

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration {
                name: "slow".into(),
                display_name: "Slow".into(),
                category: "test".into(),
                config_schema: serde_json::json!({}),
            }
        }

        async fn tool_processor(&self, _request: &ToolRequest, _assistant: &Assistant, tool_config: &ToolConfig) -> ToolResult {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ToolResult::ok(tool_config.placeholder.clone(), "never reached")
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(20)
        }
    }

    fn assistant() -> Assistant {
        Assistant {
            id: 1,
            name: "Tutor".into(),
            owner_user_id: 1,
            organization_id: 1,
            description: String::new(),
            system_prompt: String::new(),
            prompt_template: "{ctx}".into(),
            shared_with_organization: false,
            metadata: AssistantMetadata::default(),
            rag_collections: Vec::new(),
            rag_top_k: None,
            published: true,
        }
    }

    #[tokio::test]
    async fn call_with_timeout_reports_timeout_as_tool_result_error() {
        let cfg = ToolConfig {
            tool_name: "slow".into(),
            placeholder: "ctx".into(),
            enabled: true,
            config: serde_json::json!({}),
        };
        let result = call_with_timeout(&SlowTool, &ToolRequest::default(), &assistant(), &cfg).await;
        assert!(result.error.is_some());
        assert_eq!(result.placeholder, "ctx");
    }

    #[test]
    fn last_user_text_finds_most_recent_user_message() {
        let req = ToolRequest {
            messages: vec![Message::user("first"), Message::assistant("reply"), Message::user("second")],
            ..Default::default()
        };
        assert_eq!(req.last_user_text(), "second");
    }
}
