//! Connector layer: talks to an LLM provider, and runs the bounded tool-calling loop
//! when the provider supports function calling (§4.3, §4.7).

mod mock;
mod ollama;
mod openai;

pub use mock::MockConnector;
pub use ollama::OllamaConnector;
pub use openai::OpenAiConnector;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::LambError;
use crate::llm::{LlmResponse, ToolChoiceMode, ToolSpec};
use crate::message::Message;
use crate::stream::StreamEvent;
use crate::tool::Tool;

/// Parameters common to every completion call, independent of provider wire shape.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoiceMode,
}

/// A connector plugin: translates [`Message`] lists into provider-specific wire calls
/// (§4.3 "llm_connect(messages, stream, body, llm, assistant_owner)").
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, messages: &[Message], params: &CompletionParams) -> Result<LlmResponse, LambError>;

    async fn complete_stream(
        &self,
        messages: &[Message],
        params: &CompletionParams,
    ) -> Result<BoxStream<'static, Result<StreamEvent, LambError>>, LambError>;

    async fn available_models(&self) -> Result<Vec<String>, LambError>;
}

const MAX_TOOL_CALL_ITERATIONS: u32 = 5;

/// Runs the bounded tool-calling loop (§4.7): call the provider, execute any
/// requested tools, append their results, and repeat until the model stops asking for
/// tools or the iteration bound is hit.
///
/// `lookup_tool` resolves a function-calling tool name to an executable [`Tool`]; a
/// missing tool or a JSON-parse failure on its arguments does not abort the loop —
/// the tool call is answered with an error string instead, matching §4.4's tolerance
/// contract for template tools.
pub async fn run_tool_calling_loop<F>(
    connector: &dyn Connector,
    mut messages: Vec<Message>,
    params: &CompletionParams,
    lookup_tool: F,
) -> Result<LlmResponse, LambError>
where
    F: Fn(&str) -> Option<std::sync::Arc<dyn Tool>>,
{
    let mut last_response = None;
    for _ in 0..MAX_TOOL_CALL_ITERATIONS {
        let response = connector.complete(&messages, params).await?;
        if response.tool_calls.is_empty() {
            return Ok(response);
        }

        messages.push(Message::assistant_tool_calls(response.tool_calls.clone()));
        for call in &response.tool_calls {
            let args: serde_json::Value = serde_json::from_str(&call.arguments).unwrap_or(serde_json::json!({}));
            let result = match lookup_tool(&call.name) {
                Some(tool) => execute_function_tool(tool.as_ref(), args).await,
                None => format!("error: tool {} not found", call.name),
            };
            messages.push(Message::tool_result(call.id.clone(), result));
        }
        last_response = Some(response);
    }

    tracing::warn!("tool-calling loop exceeded {MAX_TOOL_CALL_ITERATIONS} iterations");
    last_response.ok_or(LambError::IterationBudgetExceeded)
}

async fn execute_function_tool(tool: &dyn Tool, args: serde_json::Value) -> String {
    use crate::assistant::{Assistant, AssistantMetadata, ToolConfig};
    use crate::tool::ToolRequest;

    let placeholder = "function_call".to_string();
    let tool_config = ToolConfig {
        tool_name: tool.name().to_string(),
        placeholder: placeholder.clone(),
        enabled: true,
        config: args,
    };
    let assistant = Assistant {
        id: 0,
        name: String::new(),
        owner_user_id: 0,
        organization_id: 0,
        description: String::new(),
        system_prompt: String::new(),
        prompt_template: String::new(),
        shared_with_organization: false,
        metadata: AssistantMetadata::default(),
        rag_collections: Vec::new(),
        rag_top_k: None,
        published: true,
    };
    let request = ToolRequest::default();
    let result = crate::tool::call_with_timeout(tool, &request, &assistant, &tool_config).await;
    match result.error {
        Some(e) if result.content.is_empty() => format!("error: {e}"),
        _ => result.content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::ToolConfig as AssistantToolConfig;
    use crate::llm::LlmUsage;
    use crate::message::ToolCallRequest;
    use crate::tool::{ToolDeclaration, ToolResult};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct ScriptedConnector {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _messages: &[Message], _params: &CompletionParams) -> Result<LlmResponse, LambError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Ok(LlmResponse {
                    content: String::new(),
                    tool_calls: vec![ToolCallRequest {
                        id: "call-1".into(),
                        name: "echo".into(),
                        arguments: "{\"text\":\"hi\"}".into(),
                    }],
                    usage: None,
                })
            } else {
                Ok(LlmResponse {
                    content: "done".into(),
                    tool_calls: vec![],
                    usage: Some(LlmUsage::default()),
                })
            }
        }

        async fn complete_stream(
            &self,
            _messages: &[Message],
            _params: &CompletionParams,
        ) -> Result<BoxStream<'static, Result<StreamEvent, LambError>>, LambError> {
            unimplemented!()
        }

        async fn available_models(&self) -> Result<Vec<String>, LambError> {
            Ok(vec![])
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration {
                name: "echo".into(),
                display_name: "Echo".into(),
                category: "test".into(),
                config_schema: serde_json::json!({}),
            }
        }

        async fn tool_processor(
            &self,
            _request: &crate::tool::ToolRequest,
            _assistant: &crate::assistant::Assistant,
            tool_config: &AssistantToolConfig,
        ) -> ToolResult {
            let text = tool_config.config.get("text").and_then(|v| v.as_str()).unwrap_or("");
            ToolResult::ok(tool_config.placeholder.clone(), text)
        }
    }

    struct LoopingConnector;

    #[async_trait]
    impl Connector for LoopingConnector {
        fn name(&self) -> &str {
            "looping"
        }

        async fn complete(&self, _messages: &[Message], _params: &CompletionParams) -> Result<LlmResponse, LambError> {
            Ok(LlmResponse {
                content: String::new(),
                tool_calls: vec![ToolCallRequest {
                    id: "call-x".into(),
                    name: "echo".into(),
                    arguments: "{}".into(),
                }],
                usage: None,
            })
        }

        async fn complete_stream(
            &self,
            _messages: &[Message],
            _params: &CompletionParams,
        ) -> Result<BoxStream<'static, Result<StreamEvent, LambError>>, LambError> {
            unimplemented!()
        }

        async fn available_models(&self) -> Result<Vec<String>, LambError> {
            Ok(vec![])
        }
    }

    fn params() -> CompletionParams {
        CompletionParams {
            model: "gpt-4o-mini".into(),
            temperature: None,
            max_tokens: None,
            tools: vec![],
            tool_choice: ToolChoiceMode::Auto,
        }
    }

    #[tokio::test]
    async fn loop_executes_tool_then_returns_final_response() {
        let connector = ScriptedConnector { calls: AtomicU32::new(0) };
        let echo: Arc<dyn Tool> = Arc::new(EchoTool);
        let response = run_tool_calling_loop(&connector, vec![Message::user("hi")], &params(), |name| {
            if name == "echo" {
                Some(echo.clone())
            } else {
                None
            }
        })
        .await
        .unwrap();
        assert_eq!(response.content, "done");
    }

    #[tokio::test]
    async fn loop_stops_at_iteration_bound_and_returns_last_response() {
        let connector = LoopingConnector;
        let echo: Arc<dyn Tool> = Arc::new(EchoTool);
        let response = run_tool_calling_loop(&connector, vec![Message::user("hi")], &params(), |_| Some(echo.clone()))
            .await
            .unwrap();
        assert!(!response.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_name_does_not_abort_loop() {
        let connector = ScriptedConnector { calls: AtomicU32::new(0) };
        let response = run_tool_calling_loop(&connector, vec![Message::user("hi")], &params(), |_| None)
            .await
            .unwrap();
        assert_eq!(response.content, "done");
    }
}
