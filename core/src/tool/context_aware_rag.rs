//! Extends `simple_rag` with a small-fast-model query rewrite over recent history
//! (§4.4 "context_aware_rag / hierarchical_rag").

use std::sync::Arc;

use async_trait::async_trait;

use crate::assistant::{Assistant, ToolConfig};
use crate::kb_client::KbClient;
use crate::org::KnowledgeBaseConfig;
use crate::small_fast_model::SmallFastModel;
use crate::tool::simple_rag::{SimpleRagConfig, SimpleRagTool};
use crate::tool::{Tool, ToolDeclaration, ToolRequest, ToolResult};

/// Same collections/top_k config and retrieval behavior as `simple_rag`, but derives
/// the query from a small-fast-model rewrite of the last ~10 messages instead of the
/// raw last user message, falling back to it on any rewrite failure.
pub struct ContextAwareRagTool {
    inner: SimpleRagTool,
    small_fast_model: Option<Arc<SmallFastModel>>,
}

impl ContextAwareRagTool {
    pub fn new(client: Arc<dyn KbClient>, kb_config: KnowledgeBaseConfig, small_fast_model: Option<Arc<SmallFastModel>>) -> Self {
        Self {
            inner: SimpleRagTool::new(client, kb_config),
            small_fast_model,
        }
    }
}

#[async_trait]
impl Tool for ContextAwareRagTool {
    fn name(&self) -> &str {
        "context_aware_rag"
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: "context_aware_rag".into(),
            display_name: "Context-Aware Knowledge Base Search".into(),
            category: "rag".into(),
            config_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "collections": {"type": "array", "items": {"type": "string"}},
                    "top_k": {"type": "integer", "default": 5}
                },
                "required": ["collections"]
            }),
        }
    }

    async fn tool_processor(&self, request: &ToolRequest, _assistant: &Assistant, tool_config: &ToolConfig) -> ToolResult {
        let config: SimpleRagConfig = match serde_json::from_value(tool_config.config.clone()) {
            Ok(c) => c,
            Err(e) => return ToolResult::failed(tool_config.placeholder.clone(), format!("invalid context_aware_rag config: {e}")),
        };

        let query_text = match &self.small_fast_model {
            Some(sfm) => match sfm.rewrite_query(&request.messages).await {
                Ok(query) => query,
                Err(_) => request.last_user_text(),
            },
            None => request.last_user_text(),
        };

        self.inner.query_collections(&config, &query_text, &tool_config.placeholder).await
    }
}
