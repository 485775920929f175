//! OpenAI-compatible connector backed by `async-openai` (§4.3, §6.3).
//!
//! Works against any OpenAI-compatible endpoint by swapping `OpenAIConfig`'s base
//! URL, so the same connector serves both the official API and compatible proxies the
//! organization may configure.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
        ChatCompletionRequestMessageContentPartImage, ChatCompletionRequestMessageContentPartText,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestToolMessage,
        ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, ChatCompletionTool,
        ChatCompletionToolChoiceOption, ChatCompletionTools, CreateChatCompletionRequestArgs,
        FunctionCall, FunctionObject, ImageUrl as OpenAiImageUrl, ToolChoiceOptions,
    },
    Client,
};

use crate::connector::{CompletionParams, Connector};
use crate::error::LambError;
use crate::llm::{LlmResponse, LlmUsage, ToolCallDelta, ToolChoiceMode};
use crate::message::{ContentPart, Message, MessageContent, ToolCallRequest};
use crate::stream::StreamEvent;

pub struct OpenAiConnector {
    client: Client<OpenAIConfig>,
}

impl OpenAiConnector {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(config),
        }
    }

    fn messages_to_request(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m.role.as_str() {
                "system" => ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(
                    m.content.as_text().as_str(),
                )),
                "assistant" => {
                    let mut assistant_message =
                        ChatCompletionRequestAssistantMessage::from(m.content.as_text().as_str());
                    if !m.tool_calls.is_empty() {
                        assistant_message.tool_calls =
                            Some(m.tool_calls.iter().map(Self::tool_call_to_openai).collect());
                    }
                    ChatCompletionRequestMessage::Assistant(assistant_message)
                }
                "tool" => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                    content: m.content.as_text().into(),
                    tool_call_id: m.tool_call_id.clone().unwrap_or_default(),
                }),
                _ => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: Self::user_message_content(&m.content),
                    name: None,
                }),
            })
            .collect()
    }

    /// Replays a tool call the model previously requested (§4.7 tool-calling loop:
    /// `run_tool_calling_loop` appends `Message::assistant_tool_calls` so the next
    /// iteration's request carries it). Without this the provider sees a `role: "tool"`
    /// message with no preceding assistant message declaring that `tool_call_id` and
    /// rejects the request.
    fn tool_call_to_openai(tool_call: &ToolCallRequest) -> ChatCompletionMessageToolCalls {
        ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
            id: tool_call.id.clone(),
            function: FunctionCall {
                name: tool_call.name.clone(),
                arguments: tool_call.arguments.clone(),
            },
        })
    }

    /// Preserves a vision-capable assistant's mixed content list (§4.5 "vision
    /// passthrough") instead of flattening it to text: a non-empty `Parts` list maps
    /// to the provider's array-form content, text and image parts alike.
    fn user_message_content(content: &MessageContent) -> ChatCompletionRequestUserMessageContent {
        match content {
            MessageContent::Text(text) => ChatCompletionRequestUserMessageContent::Text(text.clone()),
            MessageContent::Parts(parts) => {
                ChatCompletionRequestUserMessageContent::Array(parts.iter().map(Self::content_part_to_openai).collect())
            }
        }
    }

    fn content_part_to_openai(part: &ContentPart) -> ChatCompletionRequestUserMessageContentPart {
        match part {
            ContentPart::Text { text } => {
                ChatCompletionRequestUserMessageContentPart::Text(ChatCompletionRequestMessageContentPartText {
                    text: text.clone(),
                })
            }
            ContentPart::ImageUrl { image_url } => {
                ChatCompletionRequestUserMessageContentPart::ImageUrl(ChatCompletionRequestMessageContentPartImage {
                    image_url: OpenAiImageUrl {
                        url: image_url.url.clone(),
                        detail: None,
                    },
                })
            }
        }
    }

    fn tool_choice_option(mode: ToolChoiceMode) -> ToolChoiceOptions {
        match mode {
            ToolChoiceMode::Auto => ToolChoiceOptions::Auto,
            ToolChoiceMode::None => ToolChoiceOptions::None,
            ToolChoiceMode::Required => ToolChoiceOptions::Required,
        }
    }

    fn build_request(
        &self,
        messages: &[Message],
        params: &CompletionParams,
        stream: bool,
    ) -> Result<async_openai::types::chat::CreateChatCompletionRequest, LambError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(params.model.clone());
        args.messages(Self::messages_to_request(messages));
        args.stream(stream);

        if !params.tools.is_empty() {
            let tools: Vec<ChatCompletionTools> = params
                .tools
                .iter()
                .map(|t| {
                    ChatCompletionTools::Function(ChatCompletionTool {
                        function: FunctionObject {
                            name: t.name.clone(),
                            description: Some(t.description.clone()),
                            parameters: Some(t.parameters.clone()),
                            ..Default::default()
                        },
                    })
                })
                .collect();
            args.tools(tools);
            args.tool_choice(ChatCompletionToolChoiceOption::Mode(Self::tool_choice_option(
                params.tool_choice,
            )));
        }
        if let Some(t) = params.temperature {
            args.temperature(t);
        }
        if let Some(max_tokens) = params.max_tokens {
            args.max_tokens(max_tokens);
        }

        args.build()
            .map_err(|e| LambError::Internal(format!("OpenAI request build failed: {e}")))
    }
}

#[async_trait]
impl Connector for OpenAiConnector {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, messages: &[Message], params: &CompletionParams) -> Result<LlmResponse, LambError> {
        let request = self.build_request(messages, params, false)?;
        let response = self.client.chat().create(request).await.map_err(map_openai_error)?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LambError::UpstreamUnavailable("OpenAI returned no choices".into()))?;

        let msg = choice.message;
        let content = msg.content.unwrap_or_default();
        let tool_calls: Vec<ToolCallRequest> = msg
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| match tc {
                ChatCompletionMessageToolCalls::Function(f) => Some(ToolCallRequest {
                    id: f.id,
                    name: f.function.name,
                    arguments: f.function.arguments,
                }),
            })
            .collect();
        let usage = response.usage.map(|u| LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(LlmResponse {
            content,
            tool_calls,
            usage,
        })
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        params: &CompletionParams,
    ) -> Result<BoxStream<'static, Result<StreamEvent, LambError>>, LambError> {
        let request = self.build_request(messages, params, true)?;
        let stream = self.client.chat().create_stream(request).await.map_err(map_openai_error)?;

        let mapped = stream.flat_map(|item| {
            let events: Vec<Result<StreamEvent, LambError>> = match item {
                Ok(chunk) => {
                    let mut events = Vec::new();
                    if let Some(u) = chunk.usage {
                        events.push(Ok(StreamEvent::Usage(LlmUsage {
                            prompt_tokens: u.prompt_tokens,
                            completion_tokens: u.completion_tokens,
                            total_tokens: u.total_tokens,
                        })));
                    }
                    for choice in chunk.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() {
                                events.push(Ok(StreamEvent::ContentDelta(content)));
                            }
                        }
                        if let Some(tool_calls) = choice.delta.tool_calls {
                            for tc in tool_calls {
                                events.push(Ok(StreamEvent::ToolCallDelta(ToolCallDelta {
                                    index: tc.index,
                                    id: tc.id,
                                    name: tc.function.as_ref().and_then(|f| f.name.clone()),
                                    arguments_delta: tc.function.and_then(|f| f.arguments).unwrap_or_default(),
                                })));
                            }
                        }
                    }
                    events
                }
                Err(e) => vec![Err(map_openai_error(e))],
            };
            futures::stream::iter(events)
        });

        Ok(Box::pin(mapped))
    }

    async fn available_models(&self) -> Result<Vec<String>, LambError> {
        let models = self.client.models().list().await.map_err(map_openai_error)?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

fn map_openai_error(e: async_openai::error::OpenAIError) -> LambError {
    match &e {
        async_openai::error::OpenAIError::ApiError(api_err) if api_err.code.as_deref() == Some("invalid_api_key") => {
            LambError::ProviderAuthError
        }
        _ => LambError::UpstreamUnavailable(e.to_string()),
    }
}
