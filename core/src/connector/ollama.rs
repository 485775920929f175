//! Ollama connector: a local/self-hosted provider reached over its REST API rather
//! than through `async-openai` (§6.3 "per-provider endpoint overrides").

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::connector::{CompletionParams, Connector};
use crate::error::LambError;
use crate::llm::{LlmResponse, LlmUsage};
use crate::message::Message;
use crate::stream::StreamEvent;

pub struct OllamaConnector {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelTag>,
}

#[derive(Deserialize)]
struct OllamaModelTag {
    name: String,
}

#[async_trait]
impl Connector for OllamaConnector {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, messages: &[Message], params: &CompletionParams) -> Result<LlmResponse, LambError> {
        let request = OllamaChatRequest {
            model: &params.model,
            messages: messages
                .iter()
                .map(|m| OllamaMessage {
                    role: &m.role,
                    content: m.content.as_text(),
                })
                .collect(),
            stream: false,
            options: params.temperature.map(|t| OllamaOptions { temperature: t }),
        };

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let resp = self.http.post(&url).json(&request).send().await?;
        if !resp.status().is_success() {
            return Err(LambError::UpstreamUnavailable(format!("ollama returned {}", resp.status())));
        }
        let body: OllamaChatResponse = resp.json().await?;
        Ok(LlmResponse {
            content: body.message.content,
            tool_calls: Vec::new(),
            usage: Some(LlmUsage {
                prompt_tokens: body.prompt_eval_count,
                completion_tokens: body.eval_count,
                total_tokens: body.prompt_eval_count + body.eval_count,
            }),
        })
    }

    async fn complete_stream(
        &self,
        _messages: &[Message],
        _params: &CompletionParams,
    ) -> Result<BoxStream<'static, Result<StreamEvent, LambError>>, LambError> {
        Err(LambError::Internal("ollama connector does not implement streaming yet".into()))
    }

    async fn available_models(&self) -> Result<Vec<String>, LambError> {
        let url = format!("{}/api/tags", self.base_url.trim_end_matches('/'));
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(LambError::UpstreamUnavailable(format!("ollama returned {}", resp.status())));
        }
        let body: OllamaTagsResponse = resp.json().await?;
        Ok(body.models.into_iter().map(|m| m.name).collect())
    }
}
