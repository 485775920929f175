//! Error taxonomy for the completion pipeline core.
//!
//! Every fallible operation in this crate returns [`LambError`]. Variants map to the
//! kinds in the error handling design: each carries enough context to render a stable
//! error code and an HTTP status at the server edge, without leaking provider
//! credentials or raw upstream bodies.

use thiserror::Error;

/// Errors produced by auth resolution, org config resolution, orchestration, and
/// the connector layer.
#[derive(Error, Debug)]
pub enum LambError {
    /// Token missing, malformed, or expired.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Valid token, disabled user. Callers should attach an `X-Account-Status: disabled`
    /// hint at the transport edge; the core only returns the kind.
    #[error("account disabled")]
    AccountDisabled,

    /// Authenticated but lacking role, feature flag, or organization for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Resource missing or access denied. Merged on purpose so existence cannot be
    /// inferred from the error alone.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller has access to the chat but the request targets a different assistant
    /// than the one the chat was created under.
    #[error("chat ownership conflict: {0}")]
    Conflict(String),

    /// Request payload violates shape or range constraints.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Orchestrator, connector, prompt-processor, RAG, or tool name not registered.
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// A tool raised or returned an explicit error. Orchestrators absorb this kind
    /// locally (log, skip, continue); it only escapes when a tool is invoked directly.
    #[error("tool failed: {0}")]
    ToolFailed(String),

    /// KB server, LMS, or LLM provider unreachable or returned 5xx.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// LLM provider rejected credentials. Always surfaced with a masked message.
    #[error("provider authentication failed")]
    ProviderAuthError,

    /// Tool-calling loop exceeded its iteration bound. Recovered locally by the
    /// connector (returns the last response, or terminates the stream).
    #[error("tool-calling iteration budget exceeded")]
    IterationBudgetExceeded,

    /// Configuration resolves to an inconsistent state (e.g. no organization found
    /// and no system organization configured).
    #[error("config error: {0}")]
    ConfigError(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LambError {
    /// Stable error code returned to clients alongside the HTTP status.
    pub fn code(&self) -> &'static str {
        match self {
            LambError::Unauthenticated(_) => "unauthenticated",
            LambError::AccountDisabled => "account_disabled",
            LambError::PermissionDenied(_) => "permission_denied",
            LambError::NotFound(_) => "not_found",
            LambError::Conflict(_) => "chat_ownership_conflict",
            LambError::ValidationError(_) => "validation_error",
            LambError::PluginNotFound(_) => "plugin_not_found",
            LambError::ToolFailed(_) => "tool_failed",
            LambError::UpstreamUnavailable(_) => "upstream_unavailable",
            LambError::ProviderAuthError => "provider_auth_error",
            LambError::IterationBudgetExceeded => "iteration_budget_exceeded",
            LambError::ConfigError(_) => "config_error",
            LambError::Internal(_) => "internal",
        }
    }

    /// HTTP status this error kind maps to (§6.1, §7).
    pub fn status_code(&self) -> u16 {
        match self {
            LambError::Unauthenticated(_) => 401,
            LambError::AccountDisabled => 403,
            LambError::PermissionDenied(_) => 403,
            LambError::NotFound(_) => 404,
            LambError::Conflict(_) => 409,
            LambError::ValidationError(_) => 400,
            LambError::PluginNotFound(_) => 404,
            LambError::ToolFailed(_) => 500,
            LambError::UpstreamUnavailable(_) => 502,
            LambError::ProviderAuthError => 500,
            LambError::IterationBudgetExceeded => 500,
            LambError::ConfigError(_) => 500,
            LambError::Internal(_) => 500,
        }
    }
}

impl From<reqwest::Error> for LambError {
    fn from(e: reqwest::Error) -> Self {
        LambError::UpstreamUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_disabled_maps_to_403_and_stable_code() {
        let err = LambError::AccountDisabled;
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.code(), "account_disabled");
    }

    #[test]
    fn not_found_and_permission_denied_share_no_existence_leak() {
        let nf = LambError::NotFound("assistant 42".into());
        let pd = LambError::PermissionDenied("role".into());
        assert_eq!(nf.status_code(), 404);
        assert_eq!(pd.status_code(), 403);
        assert_ne!(nf.code(), pd.code());
    }

    #[test]
    fn provider_auth_error_message_is_masked() {
        let err = LambError::ProviderAuthError;
        assert_eq!(err.to_string(), "provider authentication failed");
    }
}
