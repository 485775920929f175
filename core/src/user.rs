//! The creator user record: the account that owns assistants and belongs to exactly
//! one organization.

use serde::{Deserialize, Serialize};

/// A creator user: owns assistants, belongs to exactly one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatorUser {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub organization_id: i64,
    /// `"admin"` for system admin, otherwise `"user"`.
    pub role: String,
    /// Role within the organization: `"owner" | "admin" | "member"`.
    pub organization_role: Option<String>,
    pub enabled: bool,
    pub auth_provider: String,
    pub lti_user_id: Option<String>,
}

impl CreatorUser {
    pub fn is_org_admin(&self) -> bool {
        matches!(self.organization_role.as_deref(), Some("owner") | Some("admin"))
    }
}
