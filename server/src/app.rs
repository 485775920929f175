//! Axum app: shared state and router (§6.1).

use std::sync::Arc;

use axum::routing::post;
use axum::Router;

use lamb_core::assistant::AssistantStore;
use lamb_core::auth::AuthContextBuilder;
use lamb_core::chat::ChatStore;
use lamb_core::org::OrgConfigResolver;
use lamb_core::registry::Registries;

use crate::handlers::chat_completions;

/// Everything a request handler needs: auth resolution, assistant/org lookup, the
/// plugin registries, and the chat persistence store. One instance per process,
/// shared across requests behind `Arc` (§5 "shared resources ... process-wide and
/// read-mostly").
pub struct AppState {
    pub auth: Arc<AuthContextBuilder>,
    pub assistants: Arc<dyn AssistantStore>,
    pub org_config: Arc<OrgConfigResolver>,
    pub registries: Arc<Registries>,
    pub chat_store: Arc<dyn ChatStore>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
}
