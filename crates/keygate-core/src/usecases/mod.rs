//! Token lifecycle use cases: register, login, Google login, refresh,
//! logout and logout-all. Each composes the token codec, the refresh-token
//! service and the user/role stores, and hands the HTTP layer a finished
//! response body.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::{IdTokenVerifier, RefreshTokenService, TokenCodec};
use crate::domain::{Role, User};
use crate::error::AuthError;
use crate::store::{RoleLookup, UserLookup};

const INVALID_CREDENTIALS: &str = "invalid email or password";
const INVALID_REFRESH: &str = "refresh token is invalid or expired";

/// Issued on register and every login flavour.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access-token lifetime in seconds
    pub expires_in: u64,
}

/// Issued on refresh. `expires_at` is the access token's expiry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenLifecycle {
    users: Arc<dyn UserLookup>,
    roles: Arc<dyn RoleLookup>,
    codec: Arc<TokenCodec>,
    refresh: RefreshTokenService,
    google: Arc<dyn IdTokenVerifier>,
}

impl TokenLifecycle {
    pub fn new(
        users: Arc<dyn UserLookup>,
        roles: Arc<dyn RoleLookup>,
        codec: Arc<TokenCodec>,
        refresh: RefreshTokenService,
        google: Arc<dyn IdTokenVerifier>,
    ) -> Self {
        Self {
            users,
            roles,
            codec,
            refresh,
            google,
        }
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<TokenResponse, AuthError> {
        let email = email.trim();
        if self.users.find_by_email(email).await?.is_some() {
            return Err(AuthError::Conflict("email is already registered".into()));
        }

        let hash = hash_password_blocking(password.to_string()).await?;
        let user = User::new(email, Some(hash)).with_role(self.default_role().await?);
        self.users.create(&user).await?;
        tracing::info!(
            user_id = %user.id,
            role = ?user.role.as_ref().map(|r| &r.name),
            "user registered"
        );

        self.issue_pair(&user).await
    }

    /// Unknown email, OAuth-only account and wrong password are
    /// indistinguishable to the caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, AuthError> {
        let Some(user) = self.users.find_by_email(email.trim()).await? else {
            tracing::info!("login failed: unknown email");
            return Err(AuthError::Unauthorized(INVALID_CREDENTIALS.into()));
        };
        let Some(hash) = user.password_hash.clone() else {
            tracing::info!(user_id = %user.id, "password login against oauth-only account");
            return Err(AuthError::Unauthorized(INVALID_CREDENTIALS.into()));
        };
        if !verify_password_blocking(password.to_string(), hash).await? {
            tracing::info!(user_id = %user.id, "login failed: wrong password");
            return Err(AuthError::Unauthorized(INVALID_CREDENTIALS.into()));
        }

        tracing::info!(user_id = %user.id, "user logged in");
        self.issue_pair(&user).await
    }

    /// First login for an email creates an account without a password.
    pub async fn login_with_google(&self, id_token: &str) -> Result<TokenResponse, AuthError> {
        let identity = self.google.verify(id_token).await?;

        let user = match self.users.find_by_email(&identity.email).await? {
            Some(user) => user,
            None => {
                let user = User::new(identity.email, None).with_role(self.default_role().await?);
                match self.users.create(&user).await {
                    Ok(()) => {
                        tracing::info!(user_id = %user.id, "user created from google login");
                        user
                    }
                    // A concurrent first login created the account.
                    Err(AuthError::Conflict(_)) => self
                        .users
                        .find_by_email(&user.email)
                        .await?
                        .ok_or_else(|| AuthError::Internal("user vanished after conflict".into()))?,
                    Err(e) => return Err(e),
                }
            }
        };

        self.issue_pair(&user).await
    }

    /// Rotation: the presented token is revoked and a new one issued in the
    /// same transaction.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, AuthError> {
        let current = self.refresh.validate(refresh_token).await.map_err(reject_refresh)?;
        let user = self
            .users
            .find_by_id(current.user_id)
            .await?
            .ok_or_else(|| AuthError::Unauthorized(INVALID_REFRESH.into()))?;

        let access_token = self.codec.issue(&user)?;
        let issued = self.refresh.rotate(&current).await.map_err(reject_refresh)?;
        tracing::info!(
            user_id = %user.id,
            old_token = %current.id,
            new_token = %issued.record.id,
            "refresh token rotated"
        );

        Ok(RefreshResponse {
            access_token,
            refresh_token: issued.token,
            expires_at: self.access_expiry(),
        })
    }

    /// Revoke one refresh token.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let current = self.refresh.validate(refresh_token).await.map_err(reject_refresh)?;
        self.refresh.revoke(current.id).await?;
        tracing::info!(user_id = %current.user_id, token_id = %current.id, "user logged out");
        Ok(())
    }

    /// Revoke every refresh token of `user_id`. Returns how many were active.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        self.refresh.revoke_all_for_user(user_id).await
    }

    /// `None` while RBAC is disabled.
    async fn default_role(&self) -> Result<Option<Role>, AuthError> {
        if !self.roles.is_rbac_enabled().await? {
            return Ok(None);
        }
        self.roles.find_or_create_default().await
    }

    async fn issue_pair(&self, user: &User) -> Result<TokenResponse, AuthError> {
        let access_token = self.codec.issue(user)?;
        let issued = self.refresh.issue(user.id).await?;
        Ok(TokenResponse {
            access_token,
            refresh_token: issued.token,
            token_type: "Bearer".to_string(),
            expires_in: self.codec.ttl().as_secs(),
        })
    }

    fn access_expiry(&self) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(self.codec.ttl()).unwrap_or(chrono::Duration::MAX);
        Utc::now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Unknown and dead refresh tokens look the same from outside.
fn reject_refresh(err: AuthError) -> AuthError {
    match err {
        AuthError::NotFound(_) | AuthError::TokenInvalid(_) => {
            AuthError::Unauthorized(INVALID_REFRESH.into())
        }
        other => other,
    }
}
