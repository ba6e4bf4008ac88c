//! Authentication domain models.
//!
//! Claim types here are the only shapes that leave the token codec; there is
//! no open-ended claim map past verification.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of platform roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    User,
    ViewOnly,
    TeamOwner,
    TeamManager,
    TeamMember,
    TeamViewOnly,
}

impl Role {
    /// Role assigned to principals provisioned through SSO.
    pub const DEFAULT: Role = Role::User;

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::ViewOnly => "view-only",
            Role::TeamOwner => "team-owner",
            Role::TeamManager => "team-manager",
            Role::TeamMember => "team-member",
            Role::TeamViewOnly => "team-view-only",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a role name outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "view-only" => Ok(Role::ViewOnly),
            "team-owner" => Ok(Role::TeamOwner),
            "team-manager" => Ok(Role::TeamManager),
            "team-member" => Ok(Role::TeamMember),
            "team-view-only" => Ok(Role::TeamViewOnly),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Authenticated actor as stored in the principal repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub name: Option<String>,
    pub picture: Option<String>,
    /// Subject at the identity provider. Only ever written by the SSO client.
    pub sso_subject: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Principal {
    /// Soft-delete flag.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Fields for creating a principal.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    /// `None` for SSO-provisioned principals.
    pub password_hash: Option<String>,
    pub role: Role,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub sso_subject: Option<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct PrincipalUpdate {
    pub role: Option<Role>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub sso_subject: Option<String>,
}

/// Claims carried by a session (secure) token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Reference to a record in the session store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
}

impl SessionClaims {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            auth_key: None,
        }
    }

    pub fn for_auth_key(auth_key: impl Into<String>) -> Self {
        Self {
            user_id: None,
            auth_key: Some(auth_key.into()),
        }
    }
}

/// Claims carried by a share token. Never identifies a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareClaims {
    pub share_id: String,
}

/// Verified claims, decoded into their concrete flavor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenClaims {
    Session(SessionClaims),
    Share(ShareClaims),
}

/// Value stored in the session store under an auth key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Provider access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sso_token: Option<String>,
    /// Provider identity token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// A resolved principal plus derived, never-persisted flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedPrincipal {
    #[serde(flatten)]
    pub principal: Principal,
    pub is_admin: bool,
}

impl From<Principal> for AuthenticatedPrincipal {
    fn from(principal: Principal) -> Self {
        let is_admin = principal.role == Role::Admin;
        Self {
            principal,
            is_admin,
        }
    }
}

/// Outcome of request credential resolution.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    /// Raw bearer token as presented.
    pub token: Option<String>,
    /// Raw SSO identity token as presented.
    pub sso_token: Option<String>,
    /// Auth key referenced by the bearer token, if any.
    pub auth_key: Option<String>,
    pub share: Option<ShareClaims>,
    pub principal: Option<AuthenticatedPrincipal>,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.principal.as_ref().is_some_and(|p| p.is_admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            id: "p1".into(),
            username: "ann@example.com".into(),
            email: "ann@example.com".into(),
            role,
            name: None,
            picture: None,
            sso_subject: None,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn role_names_roundtrip_through_from_str() {
        for role in [
            Role::Admin,
            Role::User,
            Role::ViewOnly,
            Role::TeamOwner,
            Role::TeamManager,
            Role::TeamMember,
            Role::TeamViewOnly,
        ] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_kebab_case() {
        let json = serde_json::to_string(&Role::ViewOnly).unwrap();
        assert_eq!(json, "\"view-only\"");
    }

    #[test]
    fn is_admin_is_derived_from_role() {
        assert!(AuthenticatedPrincipal::from(principal(Role::Admin)).is_admin);
        assert!(!AuthenticatedPrincipal::from(principal(Role::User)).is_admin);
    }

    #[test]
    fn authenticated_principal_flattens_in_json() {
        let json = serde_json::to_value(AuthenticatedPrincipal::from(principal(Role::Admin)))
            .unwrap();
        assert_eq!(json["id"], "p1");
        assert_eq!(json["role"], "admin");
        assert_eq!(json["isAdmin"], true);
    }

    #[test]
    fn session_claims_omit_absent_fields() {
        let json = serde_json::to_value(SessionClaims::for_auth_key("auth:abc")).unwrap();
        assert_eq!(json, serde_json::json!({ "authKey": "auth:abc" }));
    }
}
