//! `POST /v1/chat/completions` (§6.1): auth, assistant/org resolution, orchestration
//! or legacy prompt processing, the connector call, and the chat persistence hook.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use lamb_core::assistant::{Assistant, ToolConfig};
use lamb_core::chat::persist_turn;
use lamb_core::connector::{run_tool_calling_loop, CompletionParams, Connector, OllamaConnector, OpenAiConnector};
use lamb_core::error::LambError;
use lamb_core::kb_client::Source;
use lamb_core::llm::{ToolChoiceMode, ToolSpec};
use lamb_core::message::Message;
use lamb_core::openai_sse::{ChatCompletionRequest, ChatCompletionResponse, Choice, ChoiceMessage, ChunkMeta, StreamToSse};
use lamb_core::stream::StreamEvent;
use lamb_core::tool::{call_with_timeout, ToolRequest, ToolResult};

use crate::app::AppState;
use crate::error::ApiError;

/// Resolves the final message list and aggregated sources to hand the connector
/// (§4.5, §4.6): the orchestrator tool graph when the assistant names one, the legacy
/// prompt processor (with a rag_processor call made beforehand) when it names that
/// instead, or the request's own messages unchanged when neither is configured.
async fn run_pipeline(state: &AppState, assistant: &Assistant, tool_request: &ToolRequest) -> Result<(Vec<Message>, Vec<Source>), LambError> {
    if let Some(name) = &assistant.metadata.orchestrator {
        let orchestrator = state.registries.orchestrators.get(name)?;
        let result = orchestrator.execute(tool_request, assistant, &assistant.metadata.tools, false, None).await;
        return Ok((result.messages, result.sources));
    }

    if let Some(name) = &assistant.metadata.prompt_processor {
        let rag_result = match &assistant.metadata.rag_processor {
            Some(rag_name) => {
                let tool = state.registries.rag_processors.get(rag_name)?;
                let tool_config = ToolConfig {
                    tool_name: rag_name.clone(),
                    placeholder: "context".to_string(),
                    enabled: true,
                    config: serde_json::json!({
                        "rag_collections": assistant.rag_collections,
                        "top_k": assistant.rag_top_k,
                    }),
                };
                call_with_timeout(tool.as_ref(), tool_request, assistant, &tool_config).await
            }
            None => ToolResult::ok("context", String::new()),
        };
        let processor = state.registries.prompt_processors.get(name)?;
        let messages = processor.process(tool_request, assistant, &rag_result.content).await;
        return Ok((messages, rag_result.sources));
    }

    Ok((tool_request.messages.clone(), Vec::new()))
}

/// Connector-level function-calling tools only apply when no orchestrator already ran
/// the assistant's tool graph — the two mechanisms would otherwise race over the same
/// declared tools (§4.7, §9(b) design note).
fn connector_tool_specs(state: &AppState, assistant: &Assistant) -> Vec<ToolSpec> {
    if assistant.metadata.orchestrator.is_some() || assistant.metadata.tool_choice_mode() == ToolChoiceMode::None {
        return Vec::new();
    }
    assistant
        .metadata
        .tools
        .iter()
        .filter(|cfg| cfg.enabled)
        .filter_map(|cfg| state.registries.tools.get(&cfg.tool_name).ok())
        .map(|tool| {
            let decl = tool.declaration();
            ToolSpec {
                name: decl.name,
                description: decl.display_name,
                parameters: decl.config_schema,
            }
        })
        .collect()
}

/// Resolves the connector to call for this request, applying the organization-resolved
/// API key and base URL (§4.7 "Applies the organization-resolved API key and base
/// URL") rather than the process-startup credentials the registry was seeded with.
/// Provider-backed connectors (`openai`, `ollama`) are rebuilt per request from
/// `OrgConfigResolver::get_provider_config`; any other registered name (e.g. a test
/// `mock` connector) falls back to the process-wide registry unchanged.
async fn resolve_connector(state: &AppState, connector_name: &str, organization_id: i64) -> Result<Arc<dyn Connector>, LambError> {
    match connector_name {
        "openai" => {
            let provider = state.org_config.get_provider_config(Some(organization_id), "openai").await?;
            let api_key = provider
                .api_key
                .ok_or_else(|| LambError::ConfigError("no openai api key configured for this organization".into()))?;
            Ok(Arc::new(OpenAiConnector::new(&api_key, provider.base_url.as_deref())) as Arc<dyn Connector>)
        }
        "ollama" => {
            let provider = state.org_config.get_provider_config(Some(organization_id), "ollama").await?;
            let base_url = provider
                .base_url
                .ok_or_else(|| LambError::ConfigError("no ollama base url configured for this organization".into()))?;
            Ok(Arc::new(OllamaConnector::new(base_url)) as Arc<dyn Connector>)
        }
        _ => state.registries.connectors.get(connector_name),
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError(LambError::Unauthenticated("missing or malformed Authorization header".into())))
}

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers)?;
    let auth = state.auth.build(token).await?;

    let assistant_id = request
        .assistant_id()
        .map_err(|e| ApiError(LambError::ValidationError(e)))?;
    let assistant = state
        .assistants
        .find_by_id(assistant_id)
        .await?
        .ok_or_else(|| ApiError(LambError::NotFound(format!("assistant {assistant_id}"))))?;
    auth.require_access_assistant(&assistant)?;

    let tool_request = ToolRequest {
        messages: request.messages.clone(),
        metadata: request.metadata.clone(),
        ..Default::default()
    };
    let (messages, sources) = run_pipeline(&state, &assistant, &tool_request).await?;

    let canonical_model = ChatCompletionRequest::canonical_model(assistant_id);
    let params = CompletionParams {
        model: assistant.metadata.model.clone().unwrap_or_else(|| canonical_model.clone()),
        temperature: request.temperature.or(assistant.metadata.temperature),
        max_tokens: request.max_tokens,
        tools: connector_tool_specs(&state, &assistant),
        tool_choice: assistant.metadata.tool_choice_mode(),
    };
    let connector_name = assistant
        .metadata
        .connector
        .clone()
        .ok_or_else(|| LambError::ValidationError("assistant has no connector configured".into()))?;
    let connector = resolve_connector(&state, &connector_name, assistant.organization_id).await?;

    let user_message = request.messages.last().cloned().unwrap_or_else(|| Message::user(""));

    if !request.stream {
        let lookup = |name: &str| state.registries.tools.get(name).ok();
        let response = run_tool_calling_loop(connector.as_ref(), messages, &params, lookup).await?;
        let assistant_message = Message::assistant(response.content.clone());

        persist_turn(
            state.chat_store.as_ref(),
            &auth,
            &assistant,
            request.chat_id.clone(),
            &user_message,
            &assistant_message,
        )
        .await?;

        let body = ChatCompletionResponse {
            id: format!("chatcmpl-{}", Uuid::new_v4()),
            object: ChatCompletionResponse::OBJECT,
            created: now_secs(),
            model: canonical_model,
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage::from_message(&assistant_message),
                finish_reason: Some(if response.tool_calls.is_empty() { "stop".to_string() } else { "tool_calls".to_string() }),
            }],
            usage: response.usage,
            sources,
        };
        return Ok(Json(body).into_response());
    }

    let mut event_stream = connector.complete_stream(&messages, &params).await?;
    let (tx, rx) = tokio::sync::mpsc::channel::<String>(32);
    let mut adapter = StreamToSse::new_with_sink(ChunkMeta::new(format!("chatcmpl-{}", Uuid::new_v4()), canonical_model), true, tx);
    adapter.push_sources(&sources);

    let chat_store = state.chat_store.clone();
    let auth_for_task = auth.clone();
    let assistant_for_task = assistant.clone();
    let chat_id = request.chat_id.clone();
    let user_message_for_task = user_message.clone();
    tokio::spawn(async move {
        let mut full_text = String::new();
        while let Some(event) = event_stream.next().await {
            match event {
                Ok(event) => {
                    if let StreamEvent::ContentDelta(text) = &event {
                        full_text.push_str(text);
                    }
                    adapter.feed(event);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "connector stream error, terminating early");
                    adapter.push_error(&e.to_string());
                    break;
                }
            }
        }
        adapter.finish();

        let assistant_message = Message::assistant(full_text);
        if let Err(e) = persist_turn(
            chat_store.as_ref(),
            &auth_for_task,
            &assistant_for_task,
            chat_id,
            &user_message_for_task,
            &assistant_message,
        )
        .await
        {
            tracing::warn!(error = %e, "failed to persist streamed chat turn");
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(|line| Ok::<_, std::io::Error>(line)));
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .expect("static response parts are always valid"))
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
