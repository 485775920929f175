//! Adapts one tool exposed by an MCP server into the orchestrator's `Tool` trait.
//!
//! The `mcp_client`/`mcp_core` stdio transport isn't a fit here: the pipeline runs as
//! a stateless HTTP service, so this calls the MCP server's HTTP `tools/call`
//! endpoint directly instead of spawning a subprocess per assistant (§4.3
//! "mcp_enabled").

use async_trait::async_trait;
use serde::Deserialize;

use crate::assistant::{Assistant, ToolConfig};
use crate::tool::{Tool, ToolDeclaration, ToolRequest, ToolResult};

#[derive(Deserialize)]
struct McpToolArgs {
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Deserialize)]
struct McpCallResponse {
    #[serde(default)]
    content: Vec<McpContentBlock>,
    #[serde(default)]
    is_error: bool,
}

#[derive(Deserialize)]
struct McpContentBlock {
    #[serde(default)]
    text: String,
}

/// Calls one named tool on a remote MCP server over HTTP.
pub struct McpTool {
    http: reqwest::Client,
    server_url: String,
    mcp_tool_name: String,
    declaration: ToolDeclaration,
}

impl McpTool {
    pub fn new(http: reqwest::Client, server_url: impl Into<String>, mcp_tool_name: impl Into<String>, description: impl Into<String>) -> Self {
        let mcp_tool_name = mcp_tool_name.into();
        let declaration = ToolDeclaration {
            name: mcp_tool_name.clone(),
            display_name: mcp_tool_name.clone(),
            category: "mcp".into(),
            config_schema: serde_json::json!({
                "type": "object",
                "properties": {"arguments": {"type": "object"}}
            }),
        };
        Self {
            http,
            server_url: server_url.into(),
            mcp_tool_name,
            declaration,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.mcp_tool_name
    }

    fn declaration(&self) -> ToolDeclaration {
        self.declaration.clone()
    }

    async fn tool_processor(&self, _request: &ToolRequest, _assistant: &Assistant, tool_config: &ToolConfig) -> ToolResult {
        let args: McpToolArgs = match serde_json::from_value(tool_config.config.clone()) {
            Ok(a) => a,
            Err(e) => return ToolResult::failed(tool_config.placeholder.clone(), format!("invalid mcp tool config: {e}")),
        };

        let url = format!("{}/tools/call", self.server_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "name": self.mcp_tool_name,
            "arguments": args.arguments,
        });

        let result = async {
            let resp = self.http.post(&url).json(&body).send().await.map_err(|e| e.to_string())?;
            if !resp.status().is_success() {
                return Err(format!("mcp server returned {}", resp.status()));
            }
            resp.json::<McpCallResponse>().await.map_err(|e| e.to_string())
        }
        .await;

        match result {
            Ok(response) if response.is_error => {
                ToolResult::failed(tool_config.placeholder.clone(), response.content.into_iter().map(|c| c.text).collect::<Vec<_>>().join(""))
            }
            Ok(response) => {
                let text = response.content.into_iter().map(|c| c.text).collect::<Vec<_>>().join("\n");
                ToolResult::ok(tool_config.placeholder.clone(), text)
            }
            Err(e) => ToolResult::failed(tool_config.placeholder.clone(), e),
        }
    }
}
