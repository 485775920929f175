//! HTTP + SSE server exposing an OpenAI-compatible `/v1/chat/completions` endpoint
//! backed by the LAMB completion pipeline core.
//!
//! **Public API**: [`run_server`], [`run_server_on_listener`], [`build_state`].

mod app;
mod error;
mod fixtures;
mod handlers;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use lamb_core::auth::{AuthContextBuilder, JwtVerifier, LegacyIdentityVerifier, TokenVerifier, VerifierChain};
use lamb_core::chat::{ChatStore, InMemoryChatStore, SqliteChatStore};
use lamb_core::connector::{MockConnector, OllamaConnector, OpenAiConnector};
use lamb_core::kb_client::HttpKbClient;
use lamb_core::org::{OrgConfigResolver, ProcessDefaults};
use lamb_core::orchestrator::{ParallelOrchestrator, SequentialOrchestrator};
use lamb_core::prompt_processor::{LegacyPromptProcessor, MoodleAugmentProcessor};
use lamb_core::registry::{Registries, Registry};
use lamb_core::small_fast_model::SmallFastModel;
use lamb_core::tool::{ContextAwareRagTool, SimpleRagTool, Tool};

use app::AppState;
use fixtures::{JsonAssistantStore, JsonOrganizationStore, JsonUserStore};

const DEFAULT_ADDR: &str = "127.0.0.1:8089";

/// Builds the [`AppState`] a running process serves requests from, wiring every
/// plugin named in the organization/assistant config surface against the process
/// environment (§4.2, §6.5): an insecure dev JWT secret when `LAMB_JWT_SECRET` is
/// unset (logged loudly, never silently), a legacy identity service verifier appended
/// to the chain when `LAMB_LEGACY_IDENTITY_URL` is set, and connector/tool/
/// orchestrator/prompt-processor registries populated from whichever provider
/// credentials the environment supplies.
pub fn build_state() -> Arc<AppState> {
    let defaults = ProcessDefaults::from_env();

    let jwt_secret = std::env::var("LAMB_JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("LAMB_JWT_SECRET not set, using an insecure development default");
        "lamb-insecure-dev-secret".to_string()
    });
    let mut verifiers: Vec<Box<dyn TokenVerifier>> = vec![Box::new(JwtVerifier::new(&jwt_secret))];
    if let Ok(legacy_url) = std::env::var("LAMB_LEGACY_IDENTITY_URL") {
        verifiers.push(Box::new(LegacyIdentityVerifier::new(reqwest::Client::new(), legacy_url)));
    }
    let verifier_chain: Arc<dyn TokenVerifier> = Arc::new(VerifierChain::new(verifiers));

    let users = Arc::new(JsonUserStore::load());
    let auth = Arc::new(AuthContextBuilder::new(verifier_chain, users));

    let assistants = Arc::new(JsonAssistantStore::load());
    let org_store = Arc::new(JsonOrganizationStore::load());
    let org_config = Arc::new(OrgConfigResolver::new(org_store, defaults.clone()));

    let registries = Arc::new(build_registries(&defaults));

    let chat_store: Arc<dyn ChatStore> = match std::env::var("LAMB_CHAT_DB") {
        Ok(path) => match SqliteChatStore::new(&path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!(error = %e, path = %path, "failed to open chat store, falling back to in-memory");
                Arc::new(InMemoryChatStore::new())
            }
        },
        Err(_) => Arc::new(InMemoryChatStore::new()),
    };

    Arc::new(AppState {
        auth,
        assistants,
        org_config,
        registries,
        chat_store,
    })
}

/// Registers every built-in connector, tool, orchestrator, and prompt processor
/// against the process's resolved provider/KB config (§4.3 "registries populated at
/// startup"). Org-level overrides still apply per request through [`OrgConfigResolver`];
/// this only seeds the process-wide defaults a tool or connector is constructed with.
fn build_registries(defaults: &ProcessDefaults) -> Registries {
    let registries = Registries::new();

    if let Some(openai) = defaults.providers.get("openai") {
        if let Some(api_key) = &openai.api_key {
            registries.connectors.register(
                "openai",
                Arc::new(OpenAiConnector::new(api_key, openai.base_url.as_deref())),
            );
        }
    }
    if let Some(ollama) = defaults.providers.get("ollama") {
        if let Some(base_url) = &ollama.base_url {
            registries.connectors.register("ollama", Arc::new(OllamaConnector::new(base_url.clone())));
        }
    }
    registries.connectors.register("mock", Arc::new(MockConnector::new(Vec::new())));

    let kb_client = Arc::new(HttpKbClient::default());
    let kb_config = defaults.knowledge_base.clone().unwrap_or_default();

    let small_fast_model = defaults.small_fast_model.as_ref().and_then(|cfg| {
        registries
            .connectors
            .get(&cfg.connector)
            .ok()
            .map(|connector| Arc::new(SmallFastModel::new(connector, cfg.model.clone())))
    });

    let simple_rag = Arc::new(SimpleRagTool::new(kb_client.clone(), kb_config.clone()));
    registries.tools.register("simple_rag", simple_rag.clone());
    registries.rag_processors.register("simple_rag", simple_rag);

    let context_aware_rag = Arc::new(ContextAwareRagTool::new(kb_client, kb_config, small_fast_model));
    registries.tools.register("context_aware_rag", context_aware_rag.clone());
    registries.rag_processors.register("context_aware_rag", context_aware_rag);

    let orchestrator_tools: Arc<Registry<dyn Tool>> = Arc::new(Registry::new());
    for name in registries.tools.names() {
        if let Ok(tool) = registries.tools.get(&name) {
            orchestrator_tools.register(name, tool);
        }
    }
    registries
        .orchestrators
        .register("parallel", Arc::new(ParallelOrchestrator::new(orchestrator_tools.clone())));
    registries
        .orchestrators
        .register("sequential", Arc::new(SequentialOrchestrator::new(orchestrator_tools)));

    registries.prompt_processors.register("legacy", Arc::new(LegacyPromptProcessor));
    registries
        .prompt_processors
        .register("moodle_augment", Arc::new(MoodleAugmentProcessor::new(None)));

    registries
}

/// Runs the server on an existing listener. Used by tests (bind to `127.0.0.1:0`, then
/// pass the listener so the ephemeral port is known before `axum::serve` blocks).
pub async fn run_server_on_listener(listener: TcpListener, state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("LAMB server listening on http://{}", addr);
    axum::serve(listener, app::router(state)).await?;
    Ok(())
}

/// Runs the server, building [`AppState`] from the process environment and listening
/// on `addr` (default `127.0.0.1:8089`, or `LAMB_SERVER_ADDR` when `addr` is `None`).
pub async fn run_server(addr: Option<&str>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr
        .map(str::to_string)
        .or_else(|| std::env::var("LAMB_SERVER_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await?;
    run_server_on_listener(listener, build_state()).await
}
