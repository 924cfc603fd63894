use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use super::roles::load_role;
use super::{bounded, conflict_or_storage, UserLookup};
use crate::domain::User;
use crate::error::AuthError;
use crate::models::{role, user};

/// SeaORM-backed [`UserLookup`].
#[derive(Clone)]
pub struct SeaUserStore {
    db: DatabaseConnection,
    timeout: Duration,
}

impl SeaUserStore {
    pub fn new(db: DatabaseConnection, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

async fn find_user(
    db: &DatabaseConnection,
    query: sea_orm::Select<user::Entity>,
) -> Result<Option<User>, DbErr> {
    let Some(model) = query.one(db).await? else {
        return Ok(None);
    };
    let role = match model.role_id {
        Some(role_id) => match role::Entity::find_by_id(role_id).one(db).await? {
            Some(role) => Some(load_role(db, role).await?),
            None => None,
        },
        None => None,
    };
    Ok(Some(User::from_model(model, role)))
}

async fn insert_user(db: &DatabaseConnection, user: &User) -> Result<(), DbErr> {
    user::ActiveModel {
        id: Set(user.id),
        email: Set(user.email.clone()),
        password_hash: Set(user.password_hash.clone()),
        role_id: Set(user.role_id()),
        created_at: Set(user.created_at),
        updated_at: Set(user.updated_at),
    }
    .insert(db)
    .await?;
    Ok(())
}

async fn set_role(
    db: &DatabaseConnection,
    user_id: Uuid,
    role_id: Option<Uuid>,
) -> Result<u64, DbErr> {
    let result = user::Entity::update_many()
        .col_expr(user::Column::RoleId, Expr::value(role_id))
        .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now().naive_utc()))
        .filter(user::Column::Id.eq(user_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

#[async_trait]
impl UserLookup for SeaUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        bounded(
            self.timeout,
            "find user by id",
            find_user(&self.db, user::Entity::find_by_id(id)),
        )
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let query = user::Entity::find().filter(user::Column::Email.eq(email));
        bounded(self.timeout, "find user by email", find_user(&self.db, query)).await
    }

    async fn create(&self, user: &User) -> Result<(), AuthError> {
        bounded(self.timeout, "create user", insert_user(&self.db, user))
            .await
            .map_err(|e| conflict_or_storage(e, || "email is already registered".to_string()))
    }

    async fn update_role(&self, user_id: Uuid, role_id: Option<Uuid>) -> Result<(), AuthError> {
        let changed = bounded(
            self.timeout,
            "update user role",
            set_role(&self.db, user_id, role_id),
        )
        .await?;
        if changed == 0 {
            return Err(AuthError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }
}
