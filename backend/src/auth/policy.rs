//! Capability checks for user management actions.

use usergate_common::UserId;

use super::AuthUser;
use crate::error::ApiError;

pub const VIEW_USERS: &str = "users.view";
pub const CREATE_USERS: &str = "users.create";
pub const UPDATE_USERS: &str = "users.update";
pub const DELETE_USERS: &str = "users.delete";

/// Action being authorized, scoped to its target where it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAbility {
    Index,
    Show(UserId),
    Store,
    Update(UserId),
    Destroy(Vec<UserId>),
}

impl UserAbility {
    pub fn name(&self) -> &'static str {
        match self {
            UserAbility::Index => "index",
            UserAbility::Show(_) => "show",
            UserAbility::Store => "store",
            UserAbility::Update(_) => "update",
            UserAbility::Destroy(_) => "destroy",
        }
    }
}

/// Authorization gate consulted before every user operation.
pub trait UserPolicy: Send + Sync {
    /// `requester` is `None` for anonymous callers.
    fn authorize(&self, requester: Option<&AuthUser>, ability: &UserAbility) -> Result<(), ApiError>;
}

/// Policy driven by the permission strings in the caller's `roles` claim.
///
/// The `admin` role passes every check. Anonymous callers are granted the
/// configured guest permissions.
#[derive(Debug, Clone, Default)]
pub struct RolePolicy {
    guest_permissions: Vec<String>,
}

impl RolePolicy {
    pub fn new(guest_permissions: Vec<String>) -> Self {
        Self { guest_permissions }
    }

    fn has_permission(&self, requester: Option<&AuthUser>, permission: &str) -> bool {
        match requester {
            Some(user) => user.is_admin() || user.has_role(permission),
            None => self.guest_permissions.iter().any(|p| p == permission),
        }
    }

    fn allows(&self, requester: Option<&AuthUser>, ability: &UserAbility) -> bool {
        let requester_id = requester.and_then(AuthUser::user_id);
        let is_self = |id: UserId| requester_id == Some(id);

        match ability {
            UserAbility::Index => self.has_permission(requester, VIEW_USERS),
            UserAbility::Show(id) => self.has_permission(requester, VIEW_USERS) || is_self(*id),
            UserAbility::Store => self.has_permission(requester, CREATE_USERS),
            UserAbility::Update(id) => {
                self.has_permission(requester, UPDATE_USERS) || is_self(*id)
            }
            // Deleting only yourself passes here so the endpoint guard can
            // refuse it with its own message instead of a bare 403.
            UserAbility::Destroy(ids) => {
                self.has_permission(requester, DELETE_USERS)
                    || matches!(ids.as_slice(), [only] if is_self(*only))
            }
        }
    }
}

impl UserPolicy for RolePolicy {
    fn authorize(&self, requester: Option<&AuthUser>, ability: &UserAbility) -> Result<(), ApiError> {
        if self.allows(requester, ability) {
            return Ok(());
        }

        tracing::warn!(
            action = ability.name(),
            requester = requester.map(|r| r.sub.as_str()).unwrap_or("guest"),
            "Authorization denied"
        );
        Err(ApiError::Forbidden)
    }
}
