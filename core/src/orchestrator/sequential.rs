//! Runs enabled tools one at a time, in declaration order, each seeing the template as
//! filled by every tool before it (§4.5 "Sequential orchestrator"). Tool order is a
//! hard contract: never reordered, never parallelized.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::assistant::{Assistant, ToolConfig};
use crate::message::Message;
use crate::orchestrator::template::{build_message_list, finalize_template, splice_placeholders};
use crate::orchestrator::verbose::build_report;
use crate::orchestrator::{resolve_enabled_tools, OrchestrationResult, Orchestrator};
use crate::registry::Registry;
use crate::stream::ProgressCallback;
use crate::tool::{call_with_timeout, Tool, ToolRequest};

pub struct SequentialOrchestrator {
    tools: Arc<Registry<dyn Tool>>,
}

impl SequentialOrchestrator {
    pub fn new(tools: Arc<Registry<dyn Tool>>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Orchestrator for SequentialOrchestrator {
    fn name(&self) -> &str {
        "sequential"
    }

    fn description(&self) -> &str {
        "Runs enabled tools one at a time, threading each tool's output into the next tool's context."
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

        let mut current_template = assistant.prompt_template.clone();
        let mut results = Vec::with_capacity(resolved.len());

        for (cfg, tool) in &resolved {
            if let Some(cb) = &stream_callback {
                cb.call(format!("tool {} started", cfg.tool_name));
            }

            let mut scoped_request = request.clone();
            scoped_request.current_context = Some(current_template.clone());
            scoped_request.accumulated_results = results.clone();

            let result = call_with_timeout(tool.as_ref(), &scoped_request, assistant, cfg).await;

            if let Some(cb) = &stream_callback {
                cb.call(format!("tool {} finished", cfg.tool_name));
            }

            current_template = splice_placeholders(&current_template, std::slice::from_ref(&result));
            results.push(result);
        }

        let mut sources = Vec::new();
        let mut tool_results = HashMap::new();
        for result in &results {
            sources.extend(result.sources.iter().cloned());
            tool_results.insert(result.placeholder.clone(), result.clone());
        }

        let history = if request.messages.is_empty() { &[][..] } else { &request.messages[..request.messages.len() - 1] };
        let last_message = request.messages.last().cloned().unwrap_or_else(|| Message::user(""));
        let user_input = last_message.content.as_text();
        let processed_text = finalize_template(&current_template, &user_input);

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
