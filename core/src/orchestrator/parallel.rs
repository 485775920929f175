//! Runs every enabled tool concurrently; later tools never see earlier tools' output
//! (§4.5 "Parallel orchestrator").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::assistant::{Assistant, ToolConfig};
use crate::message::Message;
use crate::orchestrator::template::{build_message_list, finalize_template, splice_placeholders};
use crate::orchestrator::verbose::build_report;
use crate::orchestrator::{resolve_enabled_tools, OrchestrationResult, Orchestrator};
use crate::registry::Registry;
use crate::stream::ProgressCallback;
use crate::tool::{call_with_timeout, Tool, ToolRequest};

pub struct ParallelOrchestrator {
    tools: Arc<Registry<dyn Tool>>,
}

impl ParallelOrchestrator {
    pub fn new(tools: Arc<Registry<dyn Tool>>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Orchestrator for ParallelOrchestrator {
    fn name(&self) -> &str {
        "parallel"
    }

    fn description(&self) -> &str {
        "Runs every enabled tool concurrently and splices results into the prompt template."
    }

    async fn execute(
        &self,
        request: &ToolRequest,
        assistant: &Assistant,
        tool_configs: &[ToolConfig],
        verbose: bool,
        stream_callback: Option<ProgressCallback>,
    ) -> OrchestrationResult {
        let tools = self.tools.clone();
        let resolved = resolve_enabled_tools(tool_configs, &|name| tools.get(name).ok());

        if resolved.is_empty() {
            return OrchestrationResult {
                messages: vec![Message::assistant("No tools configured for this assistant.")],
                sources: Vec::new(),
                tool_results: HashMap::new(),
                verbose_report: None,
            };
        }

        let mut join_set = JoinSet::new();
        for (cfg, tool) in resolved.iter().cloned() {
            let cfg = cfg.clone();
            let tool = tool.clone();
            let assistant = assistant.clone();
            let request = request.clone();
            let stream_callback = stream_callback.clone();
            join_set.spawn(async move {
                if let Some(cb) = &stream_callback {
                    cb.call(format!("tool {} started", cfg.tool_name));
                }
                let result = call_with_timeout(tool.as_ref(), &request, &assistant, &cfg).await;
                if let Some(cb) = &stream_callback {
                    cb.call(format!("tool {} finished", cfg.tool_name));
                }
                result
            });
        }

        let mut results = Vec::with_capacity(resolved.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "tool task panicked"),
            }
        }
        // JoinSet completion order is non-deterministic; re-sort into declared order
        // so source aggregation matches the tool-declaration order (§4.5, §5).
        results.sort_by_key(|r| tool_configs.iter().position(|c| c.placeholder == r.placeholder).unwrap_or(usize::MAX));

        let mut sources = Vec::new();
        let mut tool_results = HashMap::new();
        for result in &results {
            sources.extend(result.sources.iter().cloned());
            tool_results.insert(result.placeholder.clone(), result.clone());
        }

        let template = splice_placeholders(&assistant.prompt_template, &results);
        let history = if request.messages.is_empty() { &[][..] } else { &request.messages[..request.messages.len() - 1] };
        let last_message = request.messages.last().cloned().unwrap_or_else(|| Message::user(""));
        let user_input = last_message.content.as_text();
        let processed_text = finalize_template(&template, &user_input);

        let messages = build_message_list(assistant, history, &last_message, processed_text);

        let verbose_report = verbose.then(|| build_report(self.name(), assistant, &user_input, tool_configs, &results, &messages));

        OrchestrationResult {
            messages,
            sources,
            tool_results,
            verbose_report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::AssistantMetadata;
    use crate::kb_client::Source;
    use crate::tool::{ToolDeclaration, ToolResult};
    use std::time::Duration;

    struct FixedTool {
        placeholder: &'static str,
        content: &'static str,
    }

    #[async_trait]
    impl Tool for FixedTool {
        fn name(&self) -> &str {
            self.placeholder
        }

        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration {
                name: self.placeholder.into(),
                display_name: self.placeholder.into(),
                category: "test".into(),
                config_schema: serde_json::json!({}),
            }
        }

        async fn tool_processor(&self, _request: &ToolRequest, _assistant: &Assistant, tool_config: &ToolConfig) -> ToolResult {
            ToolResult::ok_with_sources(
                tool_config.placeholder.clone(),
                self.content,
                vec![Source {
                    url: Some(format!("https://{}", self.placeholder)),
                    filename: None,
                    chunk_index: None,
                    page: None,
                }],
            )
        }
    }

    fn assistant(template: &str) -> Assistant {
        Assistant {
            id: 1,
            name: "Tutor".into(),
            owner_user_id: 1,
            organization_id: 1,
            description: String::new(),
            system_prompt: String::new(),
            prompt_template: template.into(),
            shared_with_organization: false,
            metadata: AssistantMetadata::default(),
            rag_collections: Vec::new(),
            rag_top_k: None,
            published: true,
        }
    }

    #[tokio::test]
    async fn s1_parallel_two_tool_rag_preserves_declared_order_and_aggregates_sources() {
        let registry: Registry<dyn Tool> = Registry::new();
        registry.register("ctx1_tool", Arc::new(FixedTool { placeholder: "ctx1", content: "first context" }));
        registry.register("ctx2_tool", Arc::new(FixedTool { placeholder: "ctx2", content: "second context" }));
        let orchestrator = ParallelOrchestrator::new(Arc::new(registry));

        let assistant = assistant("Background:\n{ctx1}\n\nAlso:\n{ctx2}\n\nQ: {user_input}");
        let tool_configs = vec![
            ToolConfig { tool_name: "ctx1_tool".into(), placeholder: "ctx1".into(), enabled: true, config: serde_json::json!({}) },
            ToolConfig { tool_name: "ctx2_tool".into(), placeholder: "ctx2".into(), enabled: true, config: serde_json::json!({}) },
        ];
        let request = ToolRequest {
            messages: vec![Message::user("What is mitosis?")],
            ..Default::default()
        };

        let result = orchestrator.execute(&request, &assistant, &tool_configs, false, None).await;

        let last = result.messages.last().unwrap();
        let text = last.content.as_text();
        assert!(text.contains("first context"));
        assert!(text.contains("second context"));
        assert!(text.contains("What is mitosis?"));
        assert!(!text.contains('{'));
        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.sources[0].url.as_deref(), Some("https://ctx1"));
        assert_eq!(result.sources[1].url.as_deref(), Some("https://ctx2"));
    }

    #[tokio::test]
    async fn empty_tool_configs_produces_no_tools_message() {
        let registry: Registry<dyn Tool> = Registry::new();
        let orchestrator = ParallelOrchestrator::new(Arc::new(registry));
        let assistant = assistant("{ctx1}");
        let request = ToolRequest {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let result = orchestrator.execute(&request, &assistant, &[], false, None).await;
        assert_eq!(result.messages.len(), 1);
        assert!(result.messages[0].content.as_text().contains("No tools configured"));
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }

        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration {
                name: "failing".into(),
                display_name: "Failing".into(),
                category: "test".into(),
                config_schema: serde_json::json!({}),
            }
        }

        async fn tool_processor(&self, _request: &ToolRequest, _assistant: &Assistant, _tool_config: &ToolConfig) -> ToolResult {
            tokio::time::sleep(Duration::from_secs(60)).await;
            unreachable!()
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(10)
        }
    }

    #[tokio::test]
    async fn s7_kb_server_down_erases_placeholder_and_keeps_sources_empty() {
        let registry: Registry<dyn Tool> = Registry::new();
        registry.register("rag", Arc::new(FailingTool));
        let orchestrator = ParallelOrchestrator::new(Arc::new(registry));
        let assistant = assistant("Ctx: {ctx1}\nQ: {user_input}");
        let tool_configs = vec![ToolConfig {
            tool_name: "rag".into(),
            placeholder: "ctx1".into(),
            enabled: true,
            config: serde_json::json!({}),
        }];
        let request = ToolRequest {
            messages: vec![Message::user("hello")],
            ..Default::default()
        };
        let result = orchestrator.execute(&request, &assistant, &tool_configs, false, None).await;
        let text = result.messages.last().unwrap().content.as_text();
        assert!(!text.contains('{'));
        assert!(result.sources.is_empty());
    }
}
