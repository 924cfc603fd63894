use chrono::NaiveDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Refresh token record. Only the SHA-256 hex digest of the token is stored.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "refresh_tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// The user who owns this refresh token
    pub user_id: Uuid,

    #[sea_orm(unique)]
    #[serde(skip_serializing)]
    pub token_hash: String,

    pub expires_at: NaiveDateTime,

    pub created_at: NaiveDateTime,

    /// Set once when the token is revoked; never cleared
    pub revoked_at: Option<NaiveDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
