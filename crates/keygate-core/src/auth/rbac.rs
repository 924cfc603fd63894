//! Role administration.
//!
//! Every operation except the bootstrap helpers re-resolves the acting user
//! from storage and requires their role to be exactly `admin`. The check runs
//! before anything is read or written on the caller's behalf, so a denied
//! call leaves storage untouched.
//!
//! ```text
//! actor id ──→ verify_admin ──→ role rules ──→ RoleLookup / UserLookup
//!               (PermissionDenied)  (Forbidden, Conflict, NotFound)
//! ```

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Role, User, ADMIN_ROLE};
use crate::error::AuthError;
use crate::store::{RoleLookup, UserLookup};

/// Partial update of a role. `None` leaves the field alone; a supplied
/// permission list replaces the whole set.
#[derive(Debug, Clone, Default)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct RbacService {
    roles: Arc<dyn RoleLookup>,
    users: Arc<dyn UserLookup>,
}

impl RbacService {
    pub fn new(roles: Arc<dyn RoleLookup>, users: Arc<dyn UserLookup>) -> Self {
        Self { roles, users }
    }

    /// Resolve `actor` and require the `admin` role.
    pub async fn verify_admin(&self, actor: Uuid) -> Result<User, AuthError> {
        let user = self
            .users
            .find_by_id(actor)
            .await?
            .ok_or_else(|| AuthError::PermissionDenied("acting user does not exist".into()))?;

        if !user.is_admin() {
            tracing::warn!(%actor, "non-admin attempted role administration");
            return Err(AuthError::PermissionDenied("admin role required".into()));
        }
        Ok(user)
    }

    pub async fn create_role(
        &self,
        actor: Uuid,
        name: &str,
        permissions: Vec<String>,
    ) -> Result<Role, AuthError> {
        self.verify_admin(actor).await?;
        let name = role_name(name)?;

        if self.roles.find_by_name(&name).await?.is_some() {
            return Err(AuthError::Conflict(format!("role '{name}' already exists")));
        }

        let role = Role::new(name, permissions);
        self.roles.create(&role).await?;
        tracing::info!(%actor, role_id = %role.id, role = %role.name, "role created");
        Ok(role)
    }

    pub async fn update_role(
        &self,
        actor: Uuid,
        id: Uuid,
        update: RoleUpdate,
    ) -> Result<Role, AuthError> {
        self.verify_admin(actor).await?;
        let mut role = self.find_role(id).await?;
        if role.is_admin() {
            return Err(AuthError::Forbidden("the admin role cannot be modified".into()));
        }

        if let Some(name) = update.name {
            let name = role_name(&name)?;
            if name != role.name {
                if let Some(existing) = self.roles.find_by_name(&name).await? {
                    if existing.id != role.id {
                        return Err(AuthError::Conflict(format!("role '{name}' already exists")));
                    }
                }
                role.name = name;
            }
        }
        if let Some(permissions) = update.permissions {
            role.replace_permissions(permissions);
        }
        role.touch();

        self.roles.update(&role).await?;
        tracing::info!(%actor, role_id = %role.id, role = %role.name, "role updated");
        Ok(role)
    }

    pub async fn delete_role(&self, actor: Uuid, id: Uuid) -> Result<(), AuthError> {
        self.verify_admin(actor).await?;
        let role = self.find_role(id).await?;
        if role.is_protected() {
            return Err(AuthError::Forbidden(format!(
                "the {} role cannot be deleted",
                role.name
            )));
        }

        self.roles.delete(id).await?;
        tracing::info!(%actor, role_id = %id, role = %role.name, "role deleted");
        Ok(())
    }

    pub async fn assign_role(
        &self,
        actor: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<User, AuthError> {
        self.verify_admin(actor).await?;
        let role = self.find_role(role_id).await?;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("user {user_id}")))?;

        if user.role_id() == Some(role_id) {
            return Err(AuthError::Conflict(format!(
                "user already has the {} role",
                role.name
            )));
        }

        self.users.update_role(user_id, Some(role_id)).await?;
        tracing::info!(%actor, %user_id, role = %role.name, "role assigned");
        Ok(user.with_role(Some(role)))
    }

    pub async fn list_roles(&self, actor: Uuid) -> Result<Vec<Role>, AuthError> {
        self.verify_admin(actor).await?;
        self.roles.list().await
    }

    pub async fn get_role(&self, actor: Uuid, id: Uuid) -> Result<Role, AuthError> {
        self.verify_admin(actor).await?;
        self.find_role(id).await
    }

    /// Bootstrap: create any missing default role. No acting user.
    pub async fn seed_default_roles(&self) -> Result<Vec<Role>, AuthError> {
        self.roles.seed_defaults().await
    }

    /// Bootstrap: give an existing account the admin role. No acting user;
    /// reachable from the CLI and startup configuration only.
    pub async fn promote_admin(&self, email: &str) -> Result<User, AuthError> {
        self.roles.seed_defaults().await?;
        let admin = self
            .roles
            .find_by_name(ADMIN_ROLE)
            .await?
            .ok_or_else(|| AuthError::Internal("admin role missing after seeding".into()))?;
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("no user with email {email}")))?;

        if user.is_admin() {
            return Ok(user);
        }
        self.users.update_role(user.id, Some(admin.id)).await?;
        tracing::info!(user_id = %user.id, "user promoted to admin");
        Ok(user.with_role(Some(admin)))
    }

    async fn find_role(&self, id: Uuid) -> Result<Role, AuthError> {
        self.roles
            .find_by_id(id)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("role {id}")))
    }
}

fn role_name(raw: &str) -> Result<String, AuthError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AuthError::Validation("role name must not be empty".into()));
    }
    if name.len() > 64 {
        return Err(AuthError::Validation("role name must be at most 64 characters".into()));
    }
    Ok(name.to_string())
}
