//! Seed-data stores for running the server standalone, without the Postgres-backed
//! creator-user database the full LAMB deployment normally sits in front of (§4.8
//! design note: "the pipeline can run standalone").
//!
//! Each store loads its records once at startup from an optional JSON file named by
//! an environment variable, matching the teacher's own env-path-to-store wiring
//! (`WORKSPACE_DB`, `USER_MESSAGE_DB`). Absent a file, each store falls back to a
//! single seed record so the server is usable out of the box.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use lamb_core::assistant::{Assistant, AssistantStore};
use lamb_core::auth::UserStore;
use lamb_core::error::LambError;
use lamb_core::org::{Organization, OrganizationStore};
use lamb_core::user::CreatorUser;

fn load_json<T: serde::de::DeserializeOwned>(env_var: &str) -> Option<T> {
    let path = std::env::var(env_var).ok()?;
    let bytes = std::fs::read(Path::new(&path)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// [`UserStore`] backed by a JSON array of [`CreatorUser`] loaded from `LAMB_USERS_FILE`.
pub struct JsonUserStore {
    users: HashMap<String, CreatorUser>,
}

impl JsonUserStore {
    pub fn load() -> Self {
        let users: Vec<CreatorUser> = load_json("LAMB_USERS_FILE").unwrap_or_else(|| vec![default_user()]);
        Self {
            users: users.into_iter().map(|u| (u.email.clone(), u)).collect(),
        }
    }
}

fn default_user() -> CreatorUser {
    CreatorUser {
        id: 1,
        email: "admin@example.com".into(),
        display_name: "Administrator".into(),
        organization_id: 1,
        role: "admin".into(),
        organization_role: Some("owner".into()),
        enabled: true,
        auth_provider: "local".into(),
        lti_user_id: None,
    }
}

#[async_trait]
impl UserStore for JsonUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<CreatorUser>, LambError> {
        Ok(self.users.get(email).cloned())
    }
}

/// [`AssistantStore`] backed by a JSON array of [`Assistant`] loaded from `LAMB_ASSISTANTS_FILE`.
pub struct JsonAssistantStore {
    assistants: HashMap<i64, Assistant>,
}

impl JsonAssistantStore {
    pub fn load() -> Self {
        let assistants: Vec<Assistant> = load_json("LAMB_ASSISTANTS_FILE").unwrap_or_default();
        Self {
            assistants: assistants.into_iter().map(|a| (a.id, a)).collect(),
        }
    }
}

#[async_trait]
impl AssistantStore for JsonAssistantStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Assistant>, LambError> {
        Ok(self.assistants.get(&id).cloned())
    }
}

/// [`OrganizationStore`] backed by a JSON array of [`Organization`] loaded from
/// `LAMB_ORGANIZATIONS_FILE`. Falls back to a single system organization, which §3's
/// invariant requires to always exist.
pub struct JsonOrganizationStore {
    organizations: HashMap<i64, Organization>,
    system_org_id: i64,
}

impl JsonOrganizationStore {
    pub fn load() -> Self {
        let organizations: Vec<Organization> = load_json("LAMB_ORGANIZATIONS_FILE").unwrap_or_else(|| vec![default_system_org()]);
        let system_org_id = organizations
            .iter()
            .find(|o| o.is_system)
            .map(|o| o.id)
            .unwrap_or(1);
        Self {
            organizations: organizations.into_iter().map(|o| (o.id, o)).collect(),
            system_org_id,
        }
    }
}

fn default_system_org() -> Organization {
    Organization {
        id: 1,
        slug: "system".into(),
        display_name: "System Organization".into(),
        is_system: true,
        status: "active".into(),
        config: Default::default(),
    }
}

#[async_trait]
impl OrganizationStore for JsonOrganizationStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Organization>, LambError> {
        Ok(self.organizations.get(&id).cloned())
    }

    async fn find_system_organization(&self) -> Result<Organization, LambError> {
        self.organizations
            .get(&self.system_org_id)
            .cloned()
            .ok_or_else(|| LambError::ConfigError("no system organization configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_user_store_finds_seed_admin() {
        let store = JsonUserStore { users: HashMap::from([("admin@example.com".to_string(), default_user())]) };
        let found = store.find_by_email("admin@example.com").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn default_org_store_resolves_system_organization() {
        let store = JsonOrganizationStore {
            organizations: HashMap::from([(1, default_system_org())]),
            system_org_id: 1,
        };
        let org = store.find_system_organization().await.unwrap();
        assert!(org.is_system);
    }

    #[tokio::test]
    async fn assistant_store_returns_none_for_unknown_id() {
        let store = JsonAssistantStore { assistants: HashMap::new() };
        assert!(store.find_by_id(99).await.unwrap().is_none());
    }
}
