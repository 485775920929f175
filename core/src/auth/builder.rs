//! Builds an [`AuthContext`] from a bearer token (§4.1).

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::context::AuthContext;
use crate::auth::token::TokenVerifier;
use crate::error::LambError;
use crate::user::CreatorUser;

/// Looks up a creator user by email, the join key between a verified token and the
/// local account (tokens carry email as subject, not the internal id).
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<CreatorUser>, LambError>;
}

/// Resolves a bearer token into an [`AuthContext`]: verify, look up the user, check it
/// is enabled, and derive system/org admin status.
pub struct AuthContextBuilder {
    verifier: Arc<dyn TokenVerifier>,
    users: Arc<dyn UserStore>,
}

impl AuthContextBuilder {
    pub fn new(verifier: Arc<dyn TokenVerifier>, users: Arc<dyn UserStore>) -> Self {
        Self { verifier, users }
    }

    /// Verifies `token`, resolves the owning user, and derives the effective role and
    /// admin flags. Fails with [`LambError::Unauthenticated`] for a missing or invalid
    /// token or an unknown user, and [`LambError::AccountDisabled`] for a disabled one.
    pub async fn build(&self, token: &str) -> Result<AuthContext, LambError> {
        let claims = self.verifier.verify(token).await?;

        let user = self
            .users
            .find_by_email(&claims.email)
            .await?
            .ok_or_else(|| LambError::Unauthenticated(format!("no account for {}", claims.email)))?;

        if !user.enabled {
            return Err(LambError::AccountDisabled);
        }

        let effective_role = claims.role.clone().unwrap_or_else(|| user.role.clone());
        let is_system_admin = effective_role == "admin";
        let is_org_admin = user.is_org_admin();

        Ok(AuthContext {
            user,
            effective_role,
            is_system_admin,
            is_org_admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::TokenClaims;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FixedVerifier(Result<TokenClaims, String>);

    #[async_trait]
    impl TokenVerifier for FixedVerifier {
        async fn verify(&self, _token: &str) -> Result<TokenClaims, LambError> {
            self.0
                .clone()
                .map_err(LambError::Unauthenticated)
        }
    }

    struct MapUserStore(Mutex<HashMap<String, CreatorUser>>);

    #[async_trait]
    impl UserStore for MapUserStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<CreatorUser>, LambError> {
            Ok(self.0.lock().unwrap().get(email).cloned())
        }
    }

    fn claims(email: &str, role: Option<&str>) -> TokenClaims {
        TokenClaims {
            sub: email.into(),
            email: email.into(),
            role: role.map(str::to_string),
            exp: 0,
            iat: 0,
        }
    }

    fn user(email: &str, role: &str, org_role: Option<&str>, enabled: bool) -> CreatorUser {
        CreatorUser {
            id: 1,
            email: email.into(),
            display_name: "Test".into(),
            organization_id: 10,
            role: role.into(),
            organization_role: org_role.map(str::to_string),
            enabled,
            auth_provider: "local".into(),
            lti_user_id: None,
        }
    }

    #[tokio::test]
    async fn jwt_role_takes_precedence_over_db_role() {
        let verifier = Arc::new(FixedVerifier(Ok(claims("a@example.com", Some("admin")))));
        let mut map = HashMap::new();
        map.insert("a@example.com".to_string(), user("a@example.com", "user", None, true));
        let store = Arc::new(MapUserStore(Mutex::new(map)));
        let builder = AuthContextBuilder::new(verifier, store);

        let ctx = builder.build("token").await.unwrap();
        assert_eq!(ctx.effective_role, "admin");
        assert!(ctx.is_system_admin);
    }

    #[tokio::test]
    async fn missing_jwt_role_falls_back_to_db_role() {
        let verifier = Arc::new(FixedVerifier(Ok(claims("a@example.com", None))));
        let mut map = HashMap::new();
        map.insert("a@example.com".to_string(), user("a@example.com", "admin", None, true));
        let store = Arc::new(MapUserStore(Mutex::new(map)));
        let builder = AuthContextBuilder::new(verifier, store);

        let ctx = builder.build("token").await.unwrap();
        assert_eq!(ctx.effective_role, "admin");
        assert!(ctx.is_system_admin);
    }

    #[tokio::test]
    async fn disabled_account_fails_with_account_disabled() {
        let verifier = Arc::new(FixedVerifier(Ok(claims("a@example.com", None))));
        let mut map = HashMap::new();
        map.insert("a@example.com".to_string(), user("a@example.com", "user", None, false));
        let store = Arc::new(MapUserStore(Mutex::new(map)));
        let builder = AuthContextBuilder::new(verifier, store);

        let err = builder.build("token").await.unwrap_err();
        assert!(matches!(err, LambError::AccountDisabled));
    }

    #[tokio::test]
    async fn unknown_user_fails_unauthenticated() {
        let verifier = Arc::new(FixedVerifier(Ok(claims("ghost@example.com", None))));
        let store = Arc::new(MapUserStore(Mutex::new(HashMap::new())));
        let builder = AuthContextBuilder::new(verifier, store);

        let err = builder.build("token").await.unwrap_err();
        assert!(matches!(err, LambError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn invalid_token_fails_unauthenticated() {
        let verifier = Arc::new(FixedVerifier(Err("bad signature".into())));
        let store = Arc::new(MapUserStore(Mutex::new(HashMap::new())));
        let builder = AuthContextBuilder::new(verifier, store);

        let err = builder.build("token").await.unwrap_err();
        assert!(matches!(err, LambError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn org_admin_flag_derived_from_organization_role() {
        let verifier = Arc::new(FixedVerifier(Ok(claims("a@example.com", None))));
        let mut map = HashMap::new();
        map.insert(
            "a@example.com".to_string(),
            user("a@example.com", "user", Some("owner"), true),
        );
        let store = Arc::new(MapUserStore(Mutex::new(map)));
        let builder = AuthContextBuilder::new(verifier, store);

        let ctx = builder.build("token").await.unwrap();
        assert!(ctx.is_org_admin);
        assert!(!ctx.is_system_admin);
    }
}
