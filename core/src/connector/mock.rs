//! A scriptable connector for tests that should not reach a real provider.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Mutex;

use crate::connector::{CompletionParams, Connector};
use crate::error::LambError;
use crate::llm::LlmResponse;
use crate::message::Message;
use crate::stream::StreamEvent;

pub struct MockConnector {
    responses: Mutex<Vec<LlmResponse>>,
}

impl MockConnector {
    /// Returns `responses` in order, one per `complete` call, repeating the last one
    /// once exhausted.
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    pub fn fixed(response: LlmResponse) -> Self {
        Self::new(vec![response])
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, _messages: &[Message], _params: &CompletionParams) -> Result<LlmResponse, LambError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            Ok(responses.remove(0))
        } else {
            Ok(responses.first().cloned().unwrap_or_default())
        }
    }

    async fn complete_stream(
        &self,
        _messages: &[Message],
        _params: &CompletionParams,
    ) -> Result<BoxStream<'static, Result<StreamEvent, LambError>>, LambError> {
        let response = self.complete(&[], &CompletionParams {
            model: String::new(),
            temperature: None,
            max_tokens: None,
            tools: vec![],
            tool_choice: crate::llm::ToolChoiceMode::Auto,
        })
        .await?;
        let events = vec![
            Ok(StreamEvent::ContentDelta(response.content)),
            Ok(StreamEvent::Done),
        ];
        Ok(Box::pin(futures::stream::iter(events)))
    }

    async fn available_models(&self) -> Result<Vec<String>, LambError> {
        Ok(vec!["mock-model".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_fixed_response_repeatedly() {
        let connector = MockConnector::fixed(LlmResponse {
            content: "hi".into(),
            tool_calls: vec![],
            usage: None,
        });
        let params = CompletionParams {
            model: "mock".into(),
            temperature: None,
            max_tokens: None,
            tools: vec![],
            tool_choice: crate::llm::ToolChoiceMode::Auto,
        };
        let a = connector.complete(&[], &params).await.unwrap();
        let b = connector.complete(&[], &params).await.unwrap();
        assert_eq!(a.content, "hi");
        assert_eq!(b.content, "hi");
    }
}
