use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::RefreshToken;
use crate::error::AuthError;
use crate::store::RefreshTokenStorage;

/// Generate a cryptographically secure random token (32 bytes, hex-encoded).
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 hash a token for safe database storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// A freshly minted refresh token. `token` goes to the client and is not
/// recoverable afterwards; `record` is what was persisted.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub record: RefreshToken,
}

/// Issues, validates and revokes opaque refresh tokens.
#[derive(Clone)]
pub struct RefreshTokenService {
    store: Arc<dyn RefreshTokenStorage>,
    ttl: Duration,
}

impl RefreshTokenService {
    pub fn new(store: Arc<dyn RefreshTokenStorage>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mint(&self, user_id: Uuid) -> IssuedRefreshToken {
        let token = generate_secure_token();
        let now = Utc::now().naive_utc();
        let record = RefreshToken {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash_token(&token),
            expires_at: expiry_from(now, self.ttl),
            created_at: now,
            revoked_at: None,
        };
        IssuedRefreshToken { token, record }
    }

    /// Create and persist a new token for `user_id`.
    pub async fn issue(&self, user_id: Uuid) -> Result<IssuedRefreshToken, AuthError> {
        let issued = self.mint(user_id);
        self.store.create(&issued.record).await?;
        tracing::debug!(%user_id, token_id = %issued.record.id, "issued refresh token");
        Ok(issued)
    }

    /// Look the token up by its digest.
    ///
    /// `NotFound` when nothing matches, `TokenInvalid` when the record is
    /// revoked or expired. Callers facing clients should merge the two.
    pub async fn validate(&self, token: &str) -> Result<RefreshToken, AuthError> {
        let record = self
            .store
            .find_by_hash(&hash_token(token))
            .await?
            .ok_or_else(|| AuthError::NotFound("refresh token".into()))?;

        if !record.is_valid() {
            return Err(AuthError::TokenInvalid(
                "refresh token is invalid or expired".into(),
            ));
        }
        Ok(record)
    }

    /// Idempotent.
    pub async fn revoke(&self, token_id: Uuid) -> Result<(), AuthError> {
        self.store.revoke(token_id).await?;
        tracing::debug!(%token_id, "revoked refresh token");
        Ok(())
    }

    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self.store.revoke_by_user(user_id).await?;
        tracing::info!(%user_id, revoked, "revoked all refresh tokens for user");
        Ok(revoked)
    }

    /// Exchange a validated record for a new token. The old record is revoked
    /// in the same transaction; a concurrent rotation of the same record
    /// loses with `TokenInvalid`.
    pub async fn rotate(&self, current: &RefreshToken) -> Result<IssuedRefreshToken, AuthError> {
        let issued = self.mint(current.user_id);
        if !self.store.rotate(current.id, &issued.record).await? {
            tracing::warn!(
                user_id = %current.user_id,
                token_id = %current.id,
                "refresh token was already revoked during rotation"
            );
            return Err(AuthError::TokenInvalid(
                "refresh token is invalid or expired".into(),
            ));
        }
        Ok(issued)
    }

    /// Hard-delete expired records. Invoked explicitly, never scheduled.
    pub async fn sweep_expired(&self) -> Result<u64, AuthError> {
        let deleted = self.store.delete_expired().await?;
        tracing::info!(deleted, "swept expired refresh tokens");
        Ok(deleted)
    }
}

fn expiry_from(now: NaiveDateTime, ttl: Duration) -> NaiveDateTime {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    now.checked_add_signed(ttl).unwrap_or(NaiveDateTime::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_tokens_are_32_random_bytes() {
        let a = generate_secure_token();
        let b = generate_secure_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_stable_sha256_hex() {
        let digest = hash_token("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }

    #[test]
    fn expiry_saturates() {
        let now = Utc::now().naive_utc();
        assert_eq!(expiry_from(now, Duration::from_secs(60)), now + chrono::Duration::seconds(60));
        assert_eq!(expiry_from(now, Duration::MAX), NaiveDateTime::MAX);
    }
}
