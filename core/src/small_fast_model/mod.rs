//! Auxiliary short-prompt helper used by query-optimization RAG variants (§4.4,
//! "context_aware_rag").

use std::sync::Arc;

use crate::connector::{CompletionParams, Connector};
use crate::error::LambError;
use crate::llm::ToolChoiceMode;
use crate::message::Message;

const REWRITE_SYSTEM_PROMPT: &str = "You rewrite a conversation into a single focused search query for a knowledge \
base. Reply with only the query text, nothing else.";

/// Wraps a [`Connector`] configured with a fast, cheap model for short auxiliary
/// calls such as retrieval-query rewriting.
pub struct SmallFastModel {
    connector: Arc<dyn Connector>,
    model: String,
}

impl SmallFastModel {
    pub fn new(connector: Arc<dyn Connector>, model: impl Into<String>) -> Self {
        Self {
            connector,
            model: model.into(),
        }
    }

    /// Rewrites the last ~10 messages (each truncated to 500 chars) into a focused
    /// retrieval query (§4.4). Callers fall back to the last user message on error.
    pub async fn rewrite_query(&self, history: &[Message]) -> Result<String, LambError> {
        let mut messages = vec![Message::system(REWRITE_SYSTEM_PROMPT)];
        for m in history.iter().rev().take(10).rev() {
            let text = truncate_chars(&m.content.as_text(), 500);
            messages.push(Message {
                role: m.role.clone(),
                content: text.into(),
                tool_calls: Vec::new(),
                tool_call_id: None,
            });
        }

        let params = CompletionParams {
            model: self.model.clone(),
            temperature: Some(0.0),
            max_tokens: Some(128),
            tools: Vec::new(),
            tool_choice: ToolChoiceMode::None,
        };
        let response = self.connector.complete(&messages, &params).await?;
        let query = response.content.trim().to_string();
        if query.is_empty() {
            return Err(LambError::Internal("small-fast-model returned an empty query".into()));
        }
        Ok(query)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::MockConnector;
    use crate::llm::LlmResponse;

    #[tokio::test]
    async fn rewrite_query_returns_trimmed_model_output() {
        let connector = Arc::new(MockConnector::fixed(LlmResponse {
            content: "  mitosis phases  \n".into(),
            tool_calls: vec![],
            usage: None,
        }));
        let sfm = SmallFastModel::new(connector, "gpt-4o-mini");
        let history = vec![Message::user("What is mitosis?")];
        let query = sfm.rewrite_query(&history).await.unwrap();
        assert_eq!(query, "mitosis phases");
    }

    #[tokio::test]
    async fn rewrite_query_fails_on_empty_response() {
        let connector = Arc::new(MockConnector::fixed(LlmResponse::default()));
        let sfm = SmallFastModel::new(connector, "gpt-4o-mini");
        let err = sfm.rewrite_query(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LambError::Internal(_)));
    }

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        let s = "hello world";
        assert_eq!(truncate_chars(s, 5), "hello");
        assert_eq!(truncate_chars(s, 100), s);
    }
}
