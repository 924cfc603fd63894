//! Persistence-free domain types.
//!
//! Stores translate between these and the SeaORM entities in
//! [`crate::models`]; the token codec, the RBAC service and the use cases only
//! ever see these.

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models;

/// Reserved role with an implicit wildcard permission. Cannot be renamed,
/// modified or deleted.
pub const ADMIN_ROLE: &str = "admin";
/// Default role for new accounts while RBAC is enabled. Cannot be deleted.
pub const USER_ROLE: &str = "user";
/// Example elevated role seeded alongside the two above.
pub const MODERATOR_ROLE: &str = "moderator";
/// Matches any permission name.
pub const WILDCARD_PERMISSION: &str = "*";

pub const USER_PERMISSIONS: &[&str] = &[
    "users:read:self",
    "users:write:self",
    "posts:read",
    "posts:write:self",
];

pub const MODERATOR_PERMISSIONS: &[&str] =
    &["posts:read", "posts:write", "posts:delete", "users:read"];

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub role_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    /// Ordered, duplicate-free.
    pub permissions: Vec<Permission>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Role {
    pub fn new<I, S>(name: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = now();
        let mut role = Role {
            id: Uuid::new_v4(),
            name: name.into(),
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        role.replace_permissions(permissions);
        role
    }

    /// The admin role carries no stored permission rows; its wildcard is
    /// implied by the name.
    pub fn admin() -> Self {
        Role::new(ADMIN_ROLE, std::iter::empty::<String>())
    }

    pub fn default_user() -> Self {
        Role::new(USER_ROLE, USER_PERMISSIONS.iter().copied())
    }

    pub fn moderator() -> Self {
        Role::new(MODERATOR_ROLE, MODERATOR_PERMISSIONS.iter().copied())
    }

    pub fn is_admin(&self) -> bool {
        self.name == ADMIN_ROLE
    }

    /// `admin` and `user` cannot be deleted.
    pub fn is_protected(&self) -> bool {
        self.name == ADMIN_ROLE || self.name == USER_ROLE
    }

    /// True for any permission when this is the admin role; otherwise true if
    /// the stored set holds `name` or the wildcard.
    pub fn has_permission(&self, name: &str) -> bool {
        if self.is_admin() {
            return true;
        }
        self.permissions
            .iter()
            .any(|p| p.name == name || p.name == WILDCARD_PERMISSION)
    }

    pub fn permission_names(&self) -> Vec<String> {
        self.permissions.iter().map(|p| p.name.clone()).collect()
    }

    /// Permission list embedded into access tokens.
    pub fn claim_permissions(&self) -> Vec<String> {
        if self.is_admin() {
            vec![WILDCARD_PERMISSION.to_string()]
        } else {
            self.permission_names()
        }
    }

    /// Replace the whole permission set. Blank names and repeats are dropped;
    /// first occurrence wins the position.
    pub fn replace_permissions<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut permissions: Vec<Permission> = Vec::new();
        for name in names {
            let name = name.into().trim().to_string();
            if name.is_empty() || permissions.iter().any(|p| p.name == name) {
                continue;
            }
            permissions.push(Permission {
                id: Uuid::new_v4(),
                name,
                role_id: self.id,
            });
        }
        self.permissions = permissions;
    }

    pub fn touch(&mut self) {
        self.updated_at = now();
    }

    pub(crate) fn from_models(
        role: models::role::Model,
        mut rows: Vec<models::permission::Model>,
    ) -> Self {
        rows.sort_by_key(|p| p.position);
        Role {
            id: role.id,
            name: role.name,
            permissions: rows
                .into_iter()
                .map(|p| Permission {
                    id: p.id,
                    name: p.name,
                    role_id: p.role_id,
                })
                .collect(),
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Absent for OAuth-only accounts.
    pub password_hash: Option<String>,
    pub role: Option<Role>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn new(email: impl Into<String>, password_hash: Option<String>) -> Self {
        let now = now();
        User {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash,
            role: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_role(mut self, role: Option<Role>) -> Self {
        self.role = role;
        self
    }

    pub fn role_id(&self) -> Option<Uuid> {
        self.role.as_ref().map(|r| r.id)
    }

    pub fn is_admin(&self) -> bool {
        self.role.as_ref().is_some_and(Role::is_admin)
    }

    pub(crate) fn from_model(user: models::user::Model, role: Option<Role>) -> Self {
        User {
            id: user.id,
            email: user.email,
            password_hash: user.password_hash,
            role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Persisted refresh-token record. Holds the digest, never the plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
}

impl RefreshToken {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, at: NaiveDateTime) -> bool {
        at > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now())
    }

    pub fn is_valid(&self) -> bool {
        !self.is_revoked() && !self.is_expired()
    }
}

impl From<models::refresh_token::Model> for RefreshToken {
    fn from(m: models::refresh_token::Model) -> Self {
        RefreshToken {
            id: m.id,
            user_id: m.user_id,
            token_hash: m.token_hash,
            expires_at: m.expires_at,
            created_at: m.created_at,
            revoked_at: m.revoked_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn admin_has_every_permission_without_rows() {
        let admin = Role::admin();
        assert!(admin.permissions.is_empty());
        assert!(admin.has_permission("posts:delete"));
        assert!(admin.has_permission("anything:at:all"));
        assert_eq!(admin.claim_permissions(), vec!["*".to_string()]);
    }

    #[test]
    fn regular_role_checks_exact_names() {
        let role = Role::default_user();
        assert!(role.has_permission("posts:read"));
        assert!(!role.has_permission("posts:delete"));
        assert_eq!(role.claim_permissions(), role.permission_names());
    }

    #[test]
    fn stored_wildcard_matches_everything() {
        let role = Role::new("ops", ["*"]);
        assert!(role.has_permission("servers:reboot"));
    }

    #[test]
    fn replace_permissions_keeps_order_and_drops_duplicates() {
        let mut role = Role::new("editor", ["a", "b"]);
        role.replace_permissions(["c", "a", "c", " ", "d"]);
        assert_eq!(role.permission_names(), vec!["c", "a", "d"]);
        assert!(role.permissions.iter().all(|p| p.role_id == role.id));
    }

    #[test]
    fn protected_roles() {
        assert!(Role::admin().is_protected());
        assert!(Role::default_user().is_protected());
        assert!(!Role::moderator().is_protected());
    }

    #[test]
    fn refresh_token_validity() {
        let now = Utc::now().naive_utc();
        let mut token = RefreshToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "h".into(),
            expires_at: now + Duration::hours(1),
            created_at: now,
            revoked_at: None,
        };
        assert!(token.is_valid());

        token.revoked_at = Some(now);
        assert!(!token.is_valid());

        token.revoked_at = None;
        token.expires_at = now - Duration::seconds(1);
        assert!(token.is_expired());
        assert!(!token.is_valid());
    }

    #[test]
    fn user_admin_flag_follows_role() {
        let user = User::new("a@example.com", None);
        assert!(!user.is_admin());
        assert!(user.with_role(Some(Role::admin())).is_admin());
    }
}
