//! Pluggable token verification: a native JWT signer tried first, with a legacy
//! identity service as fallback for tokens issued before the JWT migration.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::LambError;

/// Claims carried by a native LAMB JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user's email address.
    pub sub: String,
    pub email: String,
    /// `"admin"` or `"user"`, present only on tokens minted after role was added to
    /// the claim set. Older tokens fall back to the database role.
    #[serde(default)]
    pub role: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Verifies a bearer token and returns its claims, or fails.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<TokenClaims, LambError>;
}

/// Verifies tokens signed with the native HS256 JWT secret.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, LambError> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| LambError::Unauthenticated(format!("invalid token: {e}")))
    }
}

/// Delegates verification to the legacy identity service for tokens that predate the
/// JWT migration (§4.1 "token fallback chain" design note, §9).
pub struct LegacyIdentityVerifier {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct LegacyVerifyResponse {
    email: String,
    #[serde(default)]
    role: Option<String>,
}

impl LegacyIdentityVerifier {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TokenVerifier for LegacyIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, LambError> {
        let url = format!("{}/api/verify", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| LambError::UpstreamUnavailable(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LambError::Unauthenticated("legacy token rejected".into()));
        }
        if !resp.status().is_success() {
            return Err(LambError::UpstreamUnavailable(format!(
                "legacy identity service returned {}",
                resp.status()
            )));
        }
        let body: LegacyVerifyResponse = resp
            .json()
            .await
            .map_err(|e| LambError::UpstreamUnavailable(e.to_string()))?;
        Ok(TokenClaims {
            sub: body.email.clone(),
            email: body.email,
            role: body.role,
            exp: 0,
            iat: 0,
        })
    }
}

/// Tries each verifier in order, returning the first success. Used as `[jwt, legacy]`
/// so a JWT-shaped token is verified natively and anything else falls through.
pub struct VerifierChain {
    verifiers: Vec<Box<dyn TokenVerifier>>,
}

impl VerifierChain {
    pub fn new(verifiers: Vec<Box<dyn TokenVerifier>>) -> Self {
        Self { verifiers }
    }
}

#[async_trait]
impl TokenVerifier for VerifierChain {
    async fn verify(&self, token: &str) -> Result<TokenClaims, LambError> {
        let mut last_err = LambError::Unauthenticated("no verifiers configured".into());
        for verifier in &self.verifiers {
            match verifier.verify(token).await {
                Ok(claims) => return Ok(claims),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}
