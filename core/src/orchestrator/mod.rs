//! Orchestrators: the pipeline stage that runs an assistant's tool graph and splices
//! results into its prompt template (§4.5).

mod parallel;
mod sequential;
mod template;
mod verbose;

pub use parallel::ParallelOrchestrator;
pub use sequential::SequentialOrchestrator;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::assistant::{Assistant, ToolConfig};
use crate::kb_client::Source;
use crate::stream::ProgressCallback;
use crate::tool::{Tool, ToolRequest, ToolResult};

/// The outcome of one orchestration run (§4.5).
#[derive(Debug, Clone, Default)]
pub struct OrchestrationResult {
    pub messages: Vec<crate::message::Message>,
    pub sources: Vec<Source>,
    /// Debug record of every tool's raw result, keyed by placeholder, including ones
    /// that errored (§4.5 "record the error in tool_results under a debug key").
    pub tool_results: HashMap<String, ToolResult>,
    pub verbose_report: Option<String>,
}

/// A plugin that schedules an assistant's tool graph (§4.3
/// "execute(request, assistant, tool_configs, verbose, stream_callback)").
#[async_trait]
pub trait Orchestrator: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    async fn execute(
        &self,
        request: &ToolRequest,
        assistant: &Assistant,
        tool_configs: &[ToolConfig],
        verbose: bool,
        stream_callback: Option<ProgressCallback>,
    ) -> OrchestrationResult;
}

/// Resolves a [`ToolConfig`] to its registered [`Tool`], logging and skipping (per
/// §4.5 "an enabled tool whose plugin is not registered: log and skip") rather than
/// failing the whole orchestration.
fn resolve_enabled_tools<'a>(
    tool_configs: &'a [ToolConfig],
    lookup: &dyn Fn(&str) -> Option<Arc<dyn Tool>>,
) -> Vec<(&'a ToolConfig, Arc<dyn Tool>)> {
    tool_configs
        .iter()
        .filter(|cfg| cfg.enabled)
        .filter_map(|cfg| match lookup(&cfg.tool_name) {
            Some(tool) => Some((cfg, tool)),
            None => {
                tracing::warn!(tool = %cfg.tool_name, placeholder = %cfg.placeholder, "tool plugin not registered, skipping");
                None
            }
        })
        .collect()
}
