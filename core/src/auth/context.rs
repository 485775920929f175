//! The resolved identity and permission set for one request (§4.1).

use crate::assistant::Assistant;
use crate::error::LambError;
use crate::user::CreatorUser;

/// What a caller may do with a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    None,
    Read,
    ReadWrite,
}

/// The identity and derived permissions for one authenticated request. Built once per
/// request by [`crate::auth::AuthContextBuilder`] and threaded through orchestration.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: CreatorUser,
    /// The JWT role when present, otherwise the database role (§4.1).
    pub effective_role: String,
    pub is_system_admin: bool,
    pub is_org_admin: bool,
}

impl AuthContext {
    /// A caller can access an assistant it owns, any assistant in its organization when
    /// it is an org admin, an explicitly shared assistant in its organization, or —
    /// for usage only — any *published* assistant in its own organization even absent
    /// an explicit share (§4.1: "else same organization (for usage only) → shared").
    pub fn can_access_assistant(&self, assistant: &Assistant) -> bool {
        self.is_system_admin
            || assistant.owner_user_id == self.user.id
            || (self.is_org_admin && assistant.organization_id == self.user.organization_id)
            || (assistant.shared_with_organization && assistant.organization_id == self.user.organization_id)
            || (assistant.published && assistant.organization_id == self.user.organization_id)
    }

    /// Modification requires ownership, org-admin status within the same organization,
    /// or system-admin status. Sharing alone does not grant write access.
    pub fn can_modify_assistant(&self, assistant: &Assistant) -> bool {
        self.is_system_admin
            || assistant.owner_user_id == self.user.id
            || (self.is_org_admin && assistant.organization_id == self.user.organization_id)
    }

    /// A knowledge base is accessible under the same rule as assistant read access,
    /// scoped to the KB's owning organization.
    pub fn can_access_kb(&self, kb_organization_id: i64) -> bool {
        self.is_system_admin || kb_organization_id == self.user.organization_id
    }

    pub fn require_access_assistant(&self, assistant: &Assistant) -> Result<(), LambError> {
        if self.can_access_assistant(assistant) {
            Ok(())
        } else {
            Err(LambError::NotFound(format!("assistant {}", assistant.id)))
        }
    }

    pub fn require_modify_assistant(&self, assistant: &Assistant) -> Result<(), LambError> {
        if self.can_modify_assistant(assistant) {
            Ok(())
        } else {
            Err(LambError::PermissionDenied(format!(
                "cannot modify assistant {}",
                assistant.id
            )))
        }
    }

    pub fn require_system_admin(&self) -> Result<(), LambError> {
        if self.is_system_admin {
            Ok(())
        } else {
            Err(LambError::PermissionDenied("requires system admin".into()))
        }
    }
}
