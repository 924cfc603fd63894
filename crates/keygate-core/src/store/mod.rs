//! Persistence capabilities consumed by the token and RBAC services.
//!
//! Each entity gets one trait. The services only hold `Arc<dyn Trait>`, so
//! tests and alternative backends can swap the SeaORM implementations out.
//! Every call is bounded by the store deadline; dropping the returned future
//! cancels the underlying query.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{DbErr, SqlErr};
use uuid::Uuid;

use crate::domain::{RefreshToken, Role, User};
use crate::error::AuthError;

mod refresh_tokens;
mod roles;
mod users;

pub use refresh_tokens::SeaRefreshTokenStore;
pub use roles::SeaRoleStore;
pub use users::SeaUserStore;

#[async_trait]
pub trait UserLookup: Send + Sync {
    /// Load a user with its role and permissions.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError>;

    /// Load a user with its role and permissions.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    /// Persist a new user. Fails with `Conflict` when the email is taken.
    async fn create(&self, user: &User) -> Result<(), AuthError>;

    /// Point the user at `role_id`, or clear its role with `None`.
    async fn update_role(&self, user_id: Uuid, role_id: Option<Uuid>) -> Result<(), AuthError>;
}

#[async_trait]
pub trait RoleLookup: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>, AuthError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, AuthError>;

    /// Insert the role and its permission rows. Fails with `Conflict` on a
    /// duplicate name.
    async fn create(&self, role: &Role) -> Result<(), AuthError>;

    /// Write name and timestamps, and replace the whole permission set, in
    /// one transaction.
    async fn update(&self, role: &Role) -> Result<(), AuthError>;

    /// Remove the role, its permissions, and every user's reference to it, in
    /// one transaction.
    async fn delete(&self, id: Uuid) -> Result<(), AuthError>;

    /// All roles ordered by name.
    async fn list(&self) -> Result<Vec<Role>, AuthError>;

    /// The `user` role, created on demand. `None` while RBAC is disabled.
    async fn find_or_create_default(&self) -> Result<Option<Role>, AuthError>;

    /// True once at least one role row exists.
    async fn is_rbac_enabled(&self) -> Result<bool, AuthError>;

    /// Create whichever of `admin`, `user` and `moderator` is missing.
    /// Returns the roles that were created.
    async fn seed_defaults(&self) -> Result<Vec<Role>, AuthError>;
}

#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    async fn create(&self, token: &RefreshToken) -> Result<(), AuthError>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, AuthError>;

    /// Every record of the user, newest first.
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<RefreshToken>, AuthError>;

    /// Set `revoked_at` if it is still unset. Revoking twice is not an error.
    async fn revoke(&self, id: Uuid) -> Result<(), AuthError>;

    /// Revoke every active record of the user. Returns how many changed.
    async fn revoke_by_user(&self, user_id: Uuid) -> Result<u64, AuthError>;

    /// Hard-delete records whose expiry has passed. Returns how many went.
    async fn delete_expired(&self) -> Result<u64, AuthError>;

    /// Revoke `old_id` and insert `replacement` atomically. Returns `false`,
    /// inserting nothing, when `old_id` was already revoked.
    async fn rotate(&self, old_id: Uuid, replacement: &RefreshToken) -> Result<bool, AuthError>;
}

/// Run a persistence future under the store deadline.
pub(crate) async fn bounded<T, F>(deadline: Duration, context: &str, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, DbErr>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(|e| AuthError::storage(context, e)),
        Err(_) => {
            tracing::warn!(context, ?deadline, "store call timed out");
            Err(AuthError::Timeout(context.to_string()))
        }
    }
}

/// Translate a unique-constraint violation into `Conflict`, leaving every
/// other failure as a storage error.
pub(crate) fn conflict_or_storage(err: AuthError, conflict: impl FnOnce() -> String) -> AuthError {
    match &err {
        AuthError::Storage { source, .. }
            if matches!(source.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
        {
            AuthError::Conflict(conflict())
        }
        _ => err,
    }
}
