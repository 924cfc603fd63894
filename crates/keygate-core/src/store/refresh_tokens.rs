use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use super::{bounded, RefreshTokenStorage};
use crate::domain::RefreshToken;
use crate::error::AuthError;
use crate::models::refresh_token;

/// SeaORM-backed [`RefreshTokenStorage`].
#[derive(Clone)]
pub struct SeaRefreshTokenStore {
    db: DatabaseConnection,
    timeout: Duration,
}

impl SeaRefreshTokenStore {
    pub fn new(db: DatabaseConnection, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

async fn insert_token<C: ConnectionTrait>(conn: &C, token: &RefreshToken) -> Result<(), DbErr> {
    refresh_token::ActiveModel {
        id: Set(token.id),
        user_id: Set(token.user_id),
        token_hash: Set(token.token_hash.clone()),
        expires_at: Set(token.expires_at),
        created_at: Set(token.created_at),
        revoked_at: Set(token.revoked_at),
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Revoke matching rows that are still active. `NULL -> timestamp` only.
async fn revoke_where<C: ConnectionTrait>(
    conn: &C,
    filter: sea_orm::Condition,
) -> Result<u64, DbErr> {
    let result = refresh_token::Entity::update_many()
        .col_expr(
            refresh_token::Column::RevokedAt,
            Expr::value(Some(Utc::now().naive_utc())),
        )
        .filter(filter)
        .filter(refresh_token::Column::RevokedAt.is_null())
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

async fn rotate_token(
    db: &DatabaseConnection,
    old_id: Uuid,
    replacement: &RefreshToken,
) -> Result<bool, DbErr> {
    let txn = db.begin().await?;
    let revoked = revoke_where(
        &txn,
        sea_orm::Condition::all().add(refresh_token::Column::Id.eq(old_id)),
    )
    .await?;
    if revoked == 0 {
        return Ok(false);
    }
    insert_token(&txn, replacement).await?;
    txn.commit().await?;
    Ok(true)
}

async fn find_token(
    db: &DatabaseConnection,
    token_hash: &str,
) -> Result<Option<RefreshToken>, DbErr> {
    Ok(refresh_token::Entity::find()
        .filter(refresh_token::Column::TokenHash.eq(token_hash))
        .one(db)
        .await?
        .map(RefreshToken::from))
}

async fn tokens_of(db: &DatabaseConnection, user_id: Uuid) -> Result<Vec<RefreshToken>, DbErr> {
    Ok(refresh_token::Entity::find()
        .filter(refresh_token::Column::UserId.eq(user_id))
        .order_by_desc(refresh_token::Column::CreatedAt)
        .all(db)
        .await?
        .into_iter()
        .map(RefreshToken::from)
        .collect())
}

async fn delete_expired_tokens(db: &DatabaseConnection) -> Result<u64, DbErr> {
    let result = refresh_token::Entity::delete_many()
        .filter(refresh_token::Column::ExpiresAt.lt(Utc::now().naive_utc()))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

#[async_trait]
impl RefreshTokenStorage for SeaRefreshTokenStore {
    async fn create(&self, token: &RefreshToken) -> Result<(), AuthError> {
        bounded(self.timeout, "create refresh token", insert_token(&self.db, token)).await
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, AuthError> {
        bounded(
            self.timeout,
            "find refresh token",
            find_token(&self.db, token_hash),
        )
        .await
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<RefreshToken>, AuthError> {
        bounded(
            self.timeout,
            "list refresh tokens",
            tokens_of(&self.db, user_id),
        )
        .await
    }

    async fn revoke(&self, id: Uuid) -> Result<(), AuthError> {
        let filter = sea_orm::Condition::all().add(refresh_token::Column::Id.eq(id));
        bounded(
            self.timeout,
            "revoke refresh token",
            revoke_where(&self.db, filter),
        )
        .await?;
        Ok(())
    }

    async fn revoke_by_user(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let filter = sea_orm::Condition::all().add(refresh_token::Column::UserId.eq(user_id));
        bounded(
            self.timeout,
            "revoke user refresh tokens",
            revoke_where(&self.db, filter),
        )
        .await
    }

    async fn delete_expired(&self) -> Result<u64, AuthError> {
        bounded(
            self.timeout,
            "delete expired refresh tokens",
            delete_expired_tokens(&self.db),
        )
        .await
    }

    async fn rotate(&self, old_id: Uuid, replacement: &RefreshToken) -> Result<bool, AuthError> {
        bounded(
            self.timeout,
            "rotate refresh token",
            rotate_token(&self.db, old_id, replacement),
        )
        .await
    }
}
