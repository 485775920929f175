//! Identity-aware variant of the legacy prompt processor (§4.6 "moodle_augment").
//!
//! Resolves a user identifier through a priority chain before splicing the template,
//! so LTI-launched tools that key state off the learner (per-student memory, grade
//! passback) have something stable to key off of even when the client doesn't pass an
//! explicit id. Every step in the chain is best-effort: a lookup failure falls
//! through to the next identifier rather than failing the request (§4.6 "never fails
//! the request").

use std::time::Duration;

use async_trait::async_trait;

use crate::assistant::Assistant;
use crate::message::Message;
use crate::prompt_processor::{splice_legacy_template, PromptProcessor};
use crate::tool::ToolRequest;

/// Resolves an end-user email to an LMS-internal user id (§4.6 step 1: "resolve to an
/// LMS user id via a synchronous lookup to the LMS web-service endpoint").
#[async_trait]
pub trait LmsUserLookup: Send + Sync {
    async fn lookup_user_id(&self, email: &str) -> Result<String, String>;
}

/// [`LmsUserLookup`] backed by the LMS web-service endpoint over HTTP, bounded to a
/// 5s timeout per call (§4.6).
pub struct HttpLmsUserLookup {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLmsUserLookup {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[derive(serde::Deserialize)]
struct LmsUserLookupResponse {
    user_id: String,
}

#[async_trait]
impl LmsUserLookup for HttpLmsUserLookup {
    async fn lookup_user_id(&self, email: &str) -> Result<String, String> {
        let url = format!("{}/api/users/by-email", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .query(&[("email", email)])
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("LMS web service returned {}", resp.status()));
        }
        let body: LmsUserLookupResponse = resp.json().await.map_err(|e| e.to_string())?;
        Ok(body.user_id)
    }
}

fn header(request: &ToolRequest, name: &str) -> Option<String> {
    request
        .metadata
        .get("__openwebui_headers__")
        .and_then(|h| h.get(name))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn metadata_field(request: &ToolRequest, name: &str) -> Option<String> {
    request
        .metadata
        .get("metadata")
        .and_then(|m| m.get(name))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Resolves the end-user identifier through the §4.6 priority chain. Exposed
/// standalone (not only via [`MoodleAugmentProcessor::process`]) so other
/// identity-aware components (e.g. a future per-student memory tool) can share it.
pub async fn resolve_identity(request: &ToolRequest, lms: Option<&dyn LmsUserLookup>) -> String {
    if let Some(email) = header(request, "x-openwebui-user-email") {
        if let Some(lms) = lms {
            match lms.lookup_user_id(&email).await {
                Ok(user_id) => return user_id,
                Err(e) => tracing::warn!(error = %e, email = %email, "LMS user lookup failed, falling back"),
            }
        }
    }
    if let Some(id) = header(request, "x-openwebui-user-id") {
        return id;
    }
    for field in ["user_id", "lti_user_id", "lis_person_sourcedid", "email", "user"] {
        if let Some(v) = metadata_field(request, field) {
            return v;
        }
    }
    "default".to_string()
}

/// Identity-aware prompt processor: resolves a user identifier before splicing the
/// template, substituting it for an optional `{user_id}` token in the assistant's
/// template (a no-op `str::replace` when the token is absent).
pub struct MoodleAugmentProcessor {
    lms: Option<Box<dyn LmsUserLookup>>,
}

impl MoodleAugmentProcessor {
    pub fn new(lms: Option<Box<dyn LmsUserLookup>>) -> Self {
        Self { lms }
    }
}

#[async_trait]
impl PromptProcessor for MoodleAugmentProcessor {
    fn name(&self) -> &str {
        "moodle_augment"
    }

    async fn process(&self, request: &ToolRequest, assistant: &Assistant, rag_context: &str) -> Vec<Message> {
        let user_id = resolve_identity(request, self.lms.as_deref()).await;

        let history = if request.messages.is_empty() {
            &[][..]
        } else {
            &request.messages[..request.messages.len() - 1]
        };
        let user_input = request.messages.last().map(|m| m.content.as_text()).unwrap_or_default();
        let mut messages = splice_legacy_template(assistant, history, &user_input, rag_context);
        if let Some(last) = messages.last_mut() {
            last.content = last.content.as_text().replace("{user_id}", &user_id).into();
        }
        messages
    }
}
