//! Assistant configuration: the unit a creator user builds and a learner talks to (§3).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LambError;
use crate::llm::ToolChoiceMode;

/// An assistant: owner, prompt template, and the metadata blob that selects which
/// pipeline (legacy prompt processor, or orchestrator + tool graph) drives it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    pub id: i64,
    /// Unique within (owner, name); display name, not a slug.
    pub name: String,
    pub owner_user_id: i64,
    pub organization_id: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Free text with `{placeholder}` tokens the orchestrator splices tool output into.
    #[serde(default)]
    pub prompt_template: String,
    #[serde(default)]
    pub shared_with_organization: bool,
    #[serde(default)]
    pub metadata: AssistantMetadata,
    #[serde(default)]
    pub rag_collections: Vec<String>,
    pub rag_top_k: Option<u32>,
    #[serde(default)]
    pub published: bool,
}

/// The parts of an assistant's definition that select which pipeline drives it: a
/// legacy single `prompt_processor`, or an `orchestrator` with a tool graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantMetadata {
    pub connector: Option<String>,
    pub model: Option<String>,
    pub orchestrator: Option<String>,
    pub prompt_processor: Option<String>,
    pub rag_processor: Option<String>,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
    pub temperature: Option<f32>,
    /// Tool-choice mode for connector-level function calling, independent of the
    /// orchestrator's own tool graph (§4.7).
    pub tool_choice: Option<String>,
}

impl AssistantMetadata {
    pub fn tool_choice_mode(&self) -> ToolChoiceMode {
        self.tool_choice
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

/// One tool attached to an assistant's orchestration graph, in declared order, with
/// its plugin-specific configuration (§3, §4.5 "the declared list order is the
/// contract").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub tool_name: String,
    /// The `{placeholder}` token in `prompt_template` this tool's content replaces.
    pub placeholder: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_enabled() -> bool {
    true
}

/// What an assistant can do beyond plain text completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub image_generation: bool,
}

/// Store of assistants, consulted by the server to resolve the `model` field of an
/// incoming completion request into an [`Assistant`] (§6.1).
#[async_trait]
pub trait AssistantStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Assistant>, LambError>;
}
