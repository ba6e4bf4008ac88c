//! Role to permission mapping.
//!
//! The table is static: every known role maps to a fixed, non-empty set and
//! unknown role names map to the empty set.

use crate::models::auth::Role;

pub const ALL: &str = "all";
pub const WEBSITE_CREATE: &str = "website:create";
pub const WEBSITE_UPDATE: &str = "website:update";
pub const WEBSITE_DELETE: &str = "website:delete";
pub const WEBSITE_VIEW: &str = "website:view";
pub const WEBSITE_TRANSFER_TO_TEAM: &str = "website:transfer-to-team";
pub const WEBSITE_TRANSFER_TO_USER: &str = "website:transfer-to-user";
pub const TEAM_CREATE: &str = "team:create";
pub const TEAM_UPDATE: &str = "team:update";
pub const TEAM_DELETE: &str = "team:delete";

const ADMIN: &[&str] = &[
    ALL,
    WEBSITE_CREATE,
    WEBSITE_UPDATE,
    WEBSITE_DELETE,
    WEBSITE_VIEW,
    WEBSITE_TRANSFER_TO_TEAM,
    WEBSITE_TRANSFER_TO_USER,
    TEAM_CREATE,
    TEAM_UPDATE,
    TEAM_DELETE,
];

const USER: &[&str] = &[
    WEBSITE_CREATE,
    WEBSITE_UPDATE,
    WEBSITE_DELETE,
    WEBSITE_VIEW,
    TEAM_CREATE,
];

const VIEW_ONLY: &[&str] = &[WEBSITE_VIEW];

const TEAM_OWNER: &[&str] = &[
    TEAM_UPDATE,
    TEAM_DELETE,
    WEBSITE_CREATE,
    WEBSITE_UPDATE,
    WEBSITE_DELETE,
    WEBSITE_VIEW,
    WEBSITE_TRANSFER_TO_TEAM,
    WEBSITE_TRANSFER_TO_USER,
];

const TEAM_MANAGER: &[&str] = &[
    TEAM_UPDATE,
    WEBSITE_CREATE,
    WEBSITE_UPDATE,
    WEBSITE_DELETE,
    WEBSITE_VIEW,
    WEBSITE_TRANSFER_TO_TEAM,
];

const TEAM_MEMBER: &[&str] = &[WEBSITE_CREATE, WEBSITE_UPDATE, WEBSITE_DELETE, WEBSITE_VIEW];

const TEAM_VIEW_ONLY: &[&str] = &[WEBSITE_VIEW];

impl Role {
    /// The fixed permission set of this role.
    pub fn permissions(&self) -> &'static [&'static str] {
        match self {
            Role::Admin => ADMIN,
            Role::User => USER,
            Role::ViewOnly => VIEW_ONLY,
            Role::TeamOwner => TEAM_OWNER,
            Role::TeamManager => TEAM_MANAGER,
            Role::TeamMember => TEAM_MEMBER,
            Role::TeamViewOnly => TEAM_VIEW_ONLY,
        }
    }

    /// True if this role holds any of `permissions`.
    pub fn has_any<'a>(&self, permissions: impl IntoIterator<Item = &'a str>) -> bool {
        let granted = self.permissions();
        permissions.into_iter().any(|p| granted.contains(&p))
    }
}

/// True iff `role` holds **any** of the requested permissions.
///
/// Callers needing a conjunction must call once per permission. Unknown role
/// names hold nothing.
pub fn has_permission<'a>(role: &str, permissions: impl IntoIterator<Item = &'a str>) -> bool {
    match role.parse::<Role>() {
        Ok(role) => role.has_any(permissions),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_of_requested_permissions_suffices() {
        assert!(has_permission("admin", ["x", ALL]));
        assert!(has_permission("admin", [WEBSITE_VIEW, "y"]));
        assert!(!has_permission("admin", ["x", "y"]));
    }

    #[test]
    fn unknown_role_has_nothing() {
        assert!(!has_permission("unknown-role", ["x"]));
        assert!(!has_permission("unknown-role", [WEBSITE_VIEW]));
        assert!(!has_permission("", [ALL]));
    }

    #[test]
    fn empty_request_is_false() {
        assert!(!has_permission("admin", []));
    }

    #[test]
    fn view_only_cannot_write() {
        assert!(has_permission("view-only", [WEBSITE_VIEW]));
        assert!(!has_permission("view-only", [WEBSITE_UPDATE, WEBSITE_DELETE]));
    }

    #[test]
    fn every_role_has_a_non_empty_set() {
        for role in [
            Role::Admin,
            Role::User,
            Role::ViewOnly,
            Role::TeamOwner,
            Role::TeamManager,
            Role::TeamMember,
            Role::TeamViewOnly,
        ] {
            assert!(!role.permissions().is_empty(), "{role} has no permissions");
        }
    }

    #[test]
    fn only_admin_holds_all() {
        assert!(Role::Admin.has_any([ALL]));
        assert!(!Role::User.has_any([ALL]));
        assert!(!Role::TeamOwner.has_any([ALL]));
    }
}
