//! Organization records and the per-request config resolver (§3, §4.2).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::LambError;

/// An organization. Exactly one has `is_system = true` (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub slug: String,
    pub display_name: String,
    pub is_system: bool,
    pub status: String,
    #[serde(default)]
    pub config: OrganizationConfig,
}

/// Organization config document. Every field is `#[serde(default)]` so partially
/// populated JSON blobs from the existing database deserialize without error
/// (string-or-map tolerance, §4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizationConfig {
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub knowledge_base: Option<KnowledgeBaseConfig>,
    #[serde(default)]
    pub embeddings: Option<EmbeddingsConfig>,
    #[serde(default)]
    pub small_fast_model: Option<SmallFastModelConfig>,
    #[serde(default)]
    pub assistant_defaults: AssistantDefaults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub rag_enabled: bool,
    #[serde(default)]
    pub mcp_enabled: bool,
    #[serde(default)]
    pub lti_publishing: bool,
    #[serde(default)]
    pub signup_enabled: bool,
    #[serde(default)]
    pub sharing_enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    pub server_url: String,
    pub api_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmallFastModelConfig {
    pub connector: String,
    pub model: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantDefaults {
    pub connector: Option<String>,
    pub model: Option<String>,
    pub prompt_processor: Option<String>,
    pub rag_processor: Option<String>,
}

/// Process-level environment defaults, read once at startup via `lamb-config`'s
/// `load_and_apply`, never re-read from `std::env` per request (§4.2, §6.5).
#[derive(Debug, Clone, Default)]
pub struct ProcessDefaults {
    pub providers: HashMap<String, ProviderConfig>,
    pub knowledge_base: Option<KnowledgeBaseConfig>,
    pub embeddings: Option<EmbeddingsConfig>,
    pub small_fast_model: Option<SmallFastModelConfig>,
}

impl ProcessDefaults {
    /// Builds defaults from process environment variables. Missing variables leave
    /// the corresponding field unset; callers fall back further or error.
    pub fn from_env() -> Self {
        let mut providers = HashMap::new();
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            providers.insert(
                "openai".to_string(),
                ProviderConfig {
                    enabled: true,
                    api_key: Some(key),
                    base_url: std::env::var("OPENAI_BASE_URL").ok(),
                    default_model: std::env::var("OPENAI_DEFAULT_MODEL").ok(),
                    models: Vec::new(),
                },
            );
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            providers.insert(
                "ollama".to_string(),
                ProviderConfig {
                    enabled: true,
                    api_key: None,
                    base_url: Some(url),
                    default_model: std::env::var("OLLAMA_DEFAULT_MODEL").ok(),
                    models: Vec::new(),
                },
            );
        }
        let knowledge_base = std::env::var("KB_SERVER_URL").ok().map(|server_url| KnowledgeBaseConfig {
            server_url,
            api_token: std::env::var("KB_SERVER_TOKEN").unwrap_or_default(),
        });
        let embeddings = std::env::var("EMBEDDINGS_ENDPOINT").ok().map(|endpoint| EmbeddingsConfig {
            endpoint,
            api_key: std::env::var("EMBEDDINGS_API_KEY").ok(),
            model: std::env::var("EMBEDDINGS_MODEL").ok(),
        });
        let small_fast_model = std::env::var("SMALL_FAST_MODEL_MODEL").ok().map(|model| SmallFastModelConfig {
            connector: std::env::var("SMALL_FAST_MODEL_CONNECTOR").unwrap_or_else(|_| "openai".to_string()),
            model,
        });
        Self {
            providers,
            knowledge_base,
            embeddings,
            small_fast_model,
        }
    }
}

/// Store of organizations, consulted by the resolver on a cache miss.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Organization>, LambError>;
    async fn find_system_organization(&self) -> Result<Organization, LambError>;
}

/// Resolves per-organization provider/KB/embeddings/small-fast-model config with
/// environment fallback. Reads through a TTL cache keyed by organization id since org
/// config changes are rare and a full per-request DB round trip is wasteful (§4.2, §5).
pub struct OrgConfigResolver {
    store: Arc<dyn OrganizationStore>,
    defaults: ProcessDefaults,
    cache: DashMap<i64, (Organization, Instant)>,
    ttl: Duration,
}

impl OrgConfigResolver {
    pub fn new(store: Arc<dyn OrganizationStore>, defaults: ProcessDefaults) -> Self {
        Self {
            store,
            defaults,
            cache: DashMap::new(),
            ttl: Duration::from_secs(60),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Resolves the organization for `organization_id`, falling back to the system
    /// organization when `organization_id` is `None` or not found (§4.2: "If no
    /// organization is found for the owner, the resolver behaves as though the system
    /// organization were the owner").
    pub async fn resolve(&self, organization_id: Option<i64>) -> Result<Organization, LambError> {
        if let Some(id) = organization_id {
            if let Some(entry) = self.cache.get(&id) {
                let (org, cached_at) = entry.value();
                if cached_at.elapsed() < self.ttl {
                    return Ok(org.clone());
                }
            }
            if let Some(org) = self.store.find_by_id(id).await? {
                self.cache.insert(id, (org.clone(), Instant::now()));
                return Ok(org);
            }
        }
        self.store.find_system_organization().await
    }

    /// `get_provider_config(provider_name)`: organization config first, then process
    /// environment defaults for any absent field.
    pub async fn get_provider_config(
        &self,
        organization_id: Option<i64>,
        provider_name: &str,
    ) -> Result<ProviderConfig, LambError> {
        let org = self.resolve(organization_id).await?;
        let org_cfg = org.config.providers.get(provider_name).cloned();
        let default_cfg = self.defaults.providers.get(provider_name).cloned();
        Ok(merge_provider_config(org_cfg, default_cfg))
    }

    pub async fn get_knowledge_base_config(
        &self,
        organization_id: Option<i64>,
    ) -> Result<Option<KnowledgeBaseConfig>, LambError> {
        let org = self.resolve(organization_id).await?;
        Ok(org.config.knowledge_base.or_else(|| self.defaults.knowledge_base.clone()))
    }

    pub async fn get_embeddings_config(
        &self,
        organization_id: Option<i64>,
    ) -> Result<Option<EmbeddingsConfig>, LambError> {
        let org = self.resolve(organization_id).await?;
        Ok(org.config.embeddings.or_else(|| self.defaults.embeddings.clone()))
    }

    pub async fn get_small_fast_model_config(
        &self,
        organization_id: Option<i64>,
    ) -> Result<Option<SmallFastModelConfig>, LambError> {
        let org = self.resolve(organization_id).await?;
        Ok(org.config.small_fast_model.or_else(|| self.defaults.small_fast_model.clone()))
    }
}

fn merge_provider_config(org: Option<ProviderConfig>, default: Option<ProviderConfig>) -> ProviderConfig {
    match (org, default) {
        (Some(mut o), Some(d)) => {
            o.api_key = o.api_key.or(d.api_key);
            o.base_url = o.base_url.or(d.base_url);
            o.default_model = o.default_model.or(d.default_model);
            if o.models.is_empty() {
                o.models = d.models;
            }
            o.enabled = o.enabled || d.enabled;
            o
        }
        (Some(o), None) => o,
        (None, Some(d)) => d,
        (None, None) => ProviderConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedStore {
        org: Option<Organization>,
        system: Organization,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OrganizationStore for FixedStore {
        async fn find_by_id(&self, _id: i64) -> Result<Option<Organization>, LambError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.org.clone())
        }

        async fn find_system_organization(&self) -> Result<Organization, LambError> {
            Ok(self.system.clone())
        }
    }

    fn system_org() -> Organization {
        Organization {
            id: 1,
            slug: "system".into(),
            display_name: "System".into(),
            is_system: true,
            status: "active".into(),
            config: OrganizationConfig::default(),
        }
    }

    #[tokio::test]
    async fn resolve_falls_back_to_system_org_when_none_found() {
        let store = Arc::new(FixedStore {
            org: None,
            system: system_org(),
            calls: AtomicUsize::new(0),
        });
        let resolver = OrgConfigResolver::new(store, ProcessDefaults::default());
        let org = resolver.resolve(Some(42)).await.unwrap();
        assert!(org.is_system);
    }

    #[tokio::test]
    async fn resolve_falls_back_to_system_org_when_id_is_none() {
        let store = Arc::new(FixedStore {
            org: None,
            system: system_org(),
            calls: AtomicUsize::new(0),
        });
        let resolver = OrgConfigResolver::new(store, ProcessDefaults::default());
        let org = resolver.resolve(None).await.unwrap();
        assert!(org.is_system);
    }

    #[tokio::test]
    async fn resolve_caches_within_ttl() {
        let mut org = system_org();
        org.is_system = false;
        org.id = 7;
        let store = Arc::new(FixedStore {
            org: Some(org),
            system: system_org(),
            calls: AtomicUsize::new(0),
        });
        let resolver = OrgConfigResolver::new(store.clone(), ProcessDefaults::default())
            .with_ttl(Duration::from_secs(60));
        resolver.resolve(Some(7)).await.unwrap();
        resolver.resolve(Some(7)).await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_provider_config_merges_org_over_process_defaults() {
        let mut org = system_org();
        org.config.providers.insert(
            "openai".into(),
            ProviderConfig {
                enabled: true,
                api_key: Some("org-key".into()),
                base_url: None,
                default_model: None,
                models: vec![],
            },
        );
        let store = Arc::new(FixedStore {
            org: Some(org),
            system: system_org(),
            calls: AtomicUsize::new(0),
        });
        let mut defaults = ProcessDefaults::default();
        defaults.providers.insert(
            "openai".into(),
            ProviderConfig {
                enabled: true,
                api_key: Some("env-key".into()),
                base_url: Some("https://api.openai.com".into()),
                default_model: Some("gpt-4o-mini".into()),
                models: vec![],
            },
        );
        let resolver = OrgConfigResolver::new(store, defaults);
        let cfg = resolver.get_provider_config(Some(1), "openai").await.unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("org-key"));
        assert_eq!(cfg.base_url.as_deref(), Some("https://api.openai.com"));
    }
}
