//! Queries one or more knowledge base collections for the current user turn, with no
//! history awareness (§4.4 "simple_rag").

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::assistant::{Assistant, ToolConfig};
use crate::kb_client::{KbClient, Source};
use crate::org::KnowledgeBaseConfig;
use crate::tool::{Tool, ToolDeclaration, ToolRequest, ToolResult};

#[derive(Debug, Deserialize, Default)]
pub struct SimpleRagConfig {
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

fn default_top_k() -> u32 {
    5
}

/// Extracts the last user message, queries every configured collection, and joins
/// document text with `\n\n`.
pub struct SimpleRagTool {
    client: Arc<dyn KbClient>,
    kb_config: KnowledgeBaseConfig,
}

impl SimpleRagTool {
    pub fn new(client: Arc<dyn KbClient>, kb_config: KnowledgeBaseConfig) -> Self {
        Self { client, kb_config }
    }

    /// Shared by [`crate::tool::ContextAwareRagTool`]: run the collections query with
    /// an explicit query string instead of always taking it from the last message.
    pub(crate) async fn query_collections(&self, config: &SimpleRagConfig, query_text: &str, placeholder: &str) -> ToolResult {
        if config.collections.is_empty() {
            return ToolResult::failed(placeholder, "simple_rag: no collections configured");
        }

        let mut content_parts = Vec::new();
        let mut sources = Vec::new();
        let mut errors = Vec::new();

        for collection_id in &config.collections {
            match self.client.query(&self.kb_config, collection_id, query_text, config.top_k).await {
                Ok(documents) => {
                    for doc in documents {
                        content_parts.push(doc.data.clone());
                        sources.push(Source::from_metadata(&doc.metadata));
                    }
                }
                Err(e) => errors.push(format!("{collection_id}: {e}")),
            }
        }

        let content = content_parts.join("\n\n");
        if !errors.is_empty() && content.is_empty() {
            return ToolResult::failed(placeholder, errors.join("; "));
        }
        ToolResult::ok_with_sources(placeholder, content, sources)
    }
}

#[async_trait]
impl Tool for SimpleRagTool {
    fn name(&self) -> &str {
        "simple_rag"
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: "simple_rag".into(),
            display_name: "Knowledge Base Search".into(),
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
            Err(e) => return ToolResult::failed(tool_config.placeholder.clone(), format!("invalid simple_rag config: {e}")),
        };
        let query_text = request.last_user_text();
        self.query_collections(&config, &query_text, &tool_config.placeholder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::AssistantMetadata;
    use crate::kb_client::{KbDocument, KbMetadata};
    use crate::message::Message;

    struct FixedClient(std::collections::HashMap<String, Vec<KbDocument>>);

    #[async_trait]
    impl KbClient for FixedClient {
        async fn query(
            &self,
            _config: &KnowledgeBaseConfig,
            collection_id: &str,
            _query_text: &str,
            _top_k: u32,
        ) -> Result<Vec<KbDocument>, crate::error::LambError> {
            Ok(self.0.get(collection_id).cloned().unwrap_or_default())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl KbClient for FailingClient {
        async fn query(
            &self,
            _config: &KnowledgeBaseConfig,
            _collection_id: &str,
            _query_text: &str,
            _top_k: u32,
        ) -> Result<Vec<KbDocument>, crate::error::LambError> {
            Err(crate::error::LambError::UpstreamUnavailable("503".into()))
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
            prompt_template: "{ctx1}\n{ctx2}\n{user_input}".into(),
            shared_with_organization: false,
            metadata: AssistantMetadata::default(),
            rag_collections: Vec::new(),
            rag_top_k: None,
            published: true,
        }
    }

    fn kb_config() -> KnowledgeBaseConfig {
        KnowledgeBaseConfig {
            server_url: "http://kb".into(),
            api_token: "tok".into(),
        }
    }

    #[tokio::test]
    async fn aggregates_documents_from_multiple_collections() {
        let mut docs = std::collections::HashMap::new();
        docs.insert(
            "coll-a".to_string(),
            vec![KbDocument {
                data: "A fact".into(),
                metadata: KbMetadata {
                    source_url: Some("https://a".into()),
                    ..Default::default()
                },
                similarity: 0.9,
            }],
        );
        docs.insert(
            "coll-b".to_string(),
            vec![KbDocument {
                data: "B fact".into(),
                metadata: KbMetadata::default(),
                similarity: 0.8,
            }],
        );
        let tool = SimpleRagTool::new(Arc::new(FixedClient(docs)), kb_config());
        let req = ToolRequest {
            messages: vec![Message::user("What is mitosis?")],
            ..Default::default()
        };
        let cfg = ToolConfig {
            tool_name: "simple_rag".into(),
            placeholder: "ctx1".into(),
            enabled: true,
            config: serde_json::json!({"collections": ["coll-a", "coll-b"], "top_k": 5}),
        };
        let result = tool.tool_processor(&req, &assistant(), &cfg).await;
        assert!(result.content.contains("A fact"));
        assert!(result.content.contains("B fact"));
        assert_eq!(result.sources.len(), 2);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn kb_server_down_produces_error_and_empty_content() {
        let tool = SimpleRagTool::new(Arc::new(FailingClient), kb_config());
        let req = ToolRequest {
            messages: vec![Message::user("hello")],
            ..Default::default()
        };
        let cfg = ToolConfig {
            tool_name: "simple_rag".into(),
            placeholder: "ctx1".into(),
            enabled: true,
            config: serde_json::json!({"collections": ["coll-a"]}),
        };
        let result = tool.tool_processor(&req, &assistant(), &cfg).await;
        assert!(result.content.is_empty());
        assert!(result.sources.is_empty());
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn missing_collections_config_fails_gracefully() {
        let tool = SimpleRagTool::new(Arc::new(FailingClient), kb_config());
        let req = ToolRequest {
            messages: vec![Message::user("hello")],
            ..Default::default()
        };
        let cfg = ToolConfig {
            tool_name: "simple_rag".into(),
            placeholder: "ctx1".into(),
            enabled: true,
            config: serde_json::json!({}),
        };
        let result = tool.tool_processor(&req, &assistant(), &cfg).await;
        assert!(result.error.is_some());
    }
}
