use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use super::{bounded, conflict_or_storage, RoleLookup};
use crate::domain::{Role, USER_ROLE};
use crate::error::AuthError;
use crate::models::{permission, role, user};

/// SeaORM-backed [`RoleLookup`].
#[derive(Clone)]
pub struct SeaRoleStore {
    db: DatabaseConnection,
    timeout: Duration,
}

impl SeaRoleStore {
    pub fn new(db: DatabaseConnection, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

pub(super) async fn load_role<C: ConnectionTrait>(
    conn: &C,
    model: role::Model,
) -> Result<Role, DbErr> {
    let rows = permission::Entity::find()
        .filter(permission::Column::RoleId.eq(model.id))
        .order_by_asc(permission::Column::Position)
        .all(conn)
        .await?;
    Ok(Role::from_models(model, rows))
}

async fn find_one<C: ConnectionTrait>(
    conn: &C,
    query: sea_orm::Select<role::Entity>,
) -> Result<Option<Role>, DbErr> {
    match query.one(conn).await? {
        Some(model) => Ok(Some(load_role(conn, model).await?)),
        None => Ok(None),
    }
}

async fn insert_permissions<C: ConnectionTrait>(conn: &C, role: &Role) -> Result<(), DbErr> {
    if role.permissions.is_empty() {
        return Ok(());
    }
    let rows = role
        .permissions
        .iter()
        .enumerate()
        .map(|(position, p)| permission::ActiveModel {
            id: Set(p.id),
            name: Set(p.name.clone()),
            role_id: Set(role.id),
            position: Set(position as i32),
        });
    permission::Entity::insert_many(rows)
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

async fn create_role(db: &DatabaseConnection, role: &Role) -> Result<(), DbErr> {
    let txn = db.begin().await?;
    role::ActiveModel {
        id: Set(role.id),
        name: Set(role.name.clone()),
        created_at: Set(role.created_at),
        updated_at: Set(role.updated_at),
    }
    .insert(&txn)
    .await?;
    insert_permissions(&txn, role).await?;
    txn.commit().await
}

/// Returns `false` when no row matched; the transaction is rolled back.
async fn update_role(db: &DatabaseConnection, role: &Role) -> Result<bool, DbErr> {
    let txn = db.begin().await?;
    let updated = role::Entity::update_many()
        .col_expr(role::Column::Name, Expr::value(role.name.clone()))
        .col_expr(role::Column::UpdatedAt, Expr::value(role.updated_at))
        .filter(role::Column::Id.eq(role.id))
        .exec(&txn)
        .await?;
    if updated.rows_affected == 0 {
        return Ok(false);
    }

    permission::Entity::delete_many()
        .filter(permission::Column::RoleId.eq(role.id))
        .exec(&txn)
        .await?;
    insert_permissions(&txn, role).await?;

    txn.commit().await?;
    Ok(true)
}

async fn delete_role(db: &DatabaseConnection, id: Uuid) -> Result<bool, DbErr> {
    let txn = db.begin().await?;
    user::Entity::update_many()
        .col_expr(user::Column::RoleId, Expr::value(Option::<Uuid>::None))
        .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now().naive_utc()))
        .filter(user::Column::RoleId.eq(id))
        .exec(&txn)
        .await?;
    permission::Entity::delete_many()
        .filter(permission::Column::RoleId.eq(id))
        .exec(&txn)
        .await?;
    let deleted = role::Entity::delete_by_id(id).exec(&txn).await?;
    if deleted.rows_affected == 0 {
        return Ok(false);
    }
    txn.commit().await?;
    Ok(true)
}

async fn list_roles(db: &DatabaseConnection) -> Result<Vec<Role>, DbErr> {
    let roles = role::Entity::find()
        .order_by_asc(role::Column::Name)
        .all(db)
        .await?;
    if roles.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = roles.iter().map(|r| r.id).collect();
    let mut by_role: HashMap<Uuid, Vec<permission::Model>> = HashMap::new();
    for row in permission::Entity::find()
        .filter(permission::Column::RoleId.is_in(ids))
        .all(db)
        .await?
    {
        by_role.entry(row.role_id).or_default().push(row);
    }

    Ok(roles
        .into_iter()
        .map(|model| {
            let rows = by_role.remove(&model.id).unwrap_or_default();
            Role::from_models(model, rows)
        })
        .collect())
}

#[async_trait]
impl RoleLookup for SeaRoleStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>, AuthError> {
        bounded(
            self.timeout,
            "find role by id",
            find_one(&self.db, role::Entity::find_by_id(id)),
        )
        .await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, AuthError> {
        let query = role::Entity::find().filter(role::Column::Name.eq(name));
        bounded(self.timeout, "find role by name", find_one(&self.db, query)).await
    }

    async fn create(&self, role: &Role) -> Result<(), AuthError> {
        bounded(self.timeout, "create role", create_role(&self.db, role))
            .await
            .map_err(|e| conflict_or_storage(e, || format!("role '{}' already exists", role.name)))
    }

    async fn update(&self, role: &Role) -> Result<(), AuthError> {
        let found = bounded(self.timeout, "update role", update_role(&self.db, role))
            .await
            .map_err(|e| {
                conflict_or_storage(e, || format!("role '{}' already exists", role.name))
            })?;
        if !found {
            return Err(AuthError::NotFound(format!("role {}", role.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AuthError> {
        if !bounded(self.timeout, "delete role", delete_role(&self.db, id)).await? {
            return Err(AuthError::NotFound(format!("role {id}")));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Role>, AuthError> {
        bounded(self.timeout, "list roles", list_roles(&self.db)).await
    }

    async fn find_or_create_default(&self) -> Result<Option<Role>, AuthError> {
        if let Some(role) = self.find_by_name(USER_ROLE).await? {
            return Ok(Some(role));
        }
        if !self.is_rbac_enabled().await? {
            return Ok(None);
        }

        let role = Role::default_user();
        match self.create(&role).await {
            Ok(()) => {
                tracing::info!(role_id = %role.id, "created default user role");
                Ok(Some(role))
            }
            // Another request created it first.
            Err(AuthError::Conflict(_)) => self.find_by_name(USER_ROLE).await,
            Err(e) => Err(e),
        }
    }

    async fn is_rbac_enabled(&self) -> Result<bool, AuthError> {
        let count = bounded(
            self.timeout,
            "count roles",
            role::Entity::find().count(&self.db),
        )
        .await?;
        Ok(count > 0)
    }

    async fn seed_defaults(&self) -> Result<Vec<Role>, AuthError> {
        let mut created = Vec::new();
        for role in [Role::admin(), Role::default_user(), Role::moderator()] {
            if self.find_by_name(&role.name).await?.is_some() {
                continue;
            }
            match self.create(&role).await {
                Ok(()) => {
                    tracing::info!(role = %role.name, "seeded role");
                    created.push(role);
                }
                Err(AuthError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }
}
