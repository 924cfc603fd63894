use axum::extract::{Path, State};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_auth, require_role, Principal, RoleUpdate};
use crate::domain::{Role, ADMIN_ROLE};
use crate::error::AuthError;
use crate::extractors::ValidatedJson;
use crate::response::ApiResponse;

use super::auth::MessageResponse;
use super::AppState;

// ── Request / Response types ──

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 64, message = "must be between 1 and 64 characters"))]
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 64, message = "must be between 1 and 64 characters"))]
    pub name: Option<String>,
    /// Replaces the whole permission set when present
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AssignRoleRequest {
    pub user_id: Uuid,
    pub role_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleResponse {
    pub id: Uuid,
    pub name: String,
    pub permissions: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        RoleResponse {
            id: role.id,
            permissions: role.claim_permissions(),
            name: role.name,
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignRoleResponse {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
}

// ── Routes ──

/// Every route requires a valid access token carrying the admin role; the
/// service re-checks the caller against storage.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/assign", post(assign_role))
        .route(
            "/roles/{id}",
            get(get_role).put(update_role).delete(delete_role),
        )
        .route_layer(from_fn(require_role(ADMIN_ROLE)))
        .route_layer(from_fn_with_state(state.codec.clone(), require_auth))
}

// ── Handlers ──

#[utoipa::path(
    get,
    path = "/api/v1/admin/roles",
    tag = "roles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All roles ordered by name", body = ApiResponse<Vec<RoleResponse>>),
        (status = 403, description = "Caller is not an admin"),
    )
)]
pub async fn list_roles(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<ApiResponse<Vec<RoleResponse>>, AuthError> {
    let roles = state.rbac.list_roles(principal.user_id).await?;
    Ok(ApiResponse::success(roles.into_iter().map(RoleResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/roles",
    tag = "roles",
    security(("bearer_auth" = [])),
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = ApiResponse<RoleResponse>),
        (status = 400, description = "Validation failed or role name taken"),
        (status = 403, description = "Caller is not an admin"),
    )
)]
pub async fn create_role(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedJson(payload): ValidatedJson<CreateRoleRequest>,
) -> Result<ApiResponse<RoleResponse>, AuthError> {
    let role = state
        .rbac
        .create_role(principal.user_id, &payload.name, payload.permissions)
        .await?;
    Ok(ApiResponse::created(role.into()))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/roles/{id}",
    tag = "roles",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "The role", body = ApiResponse<RoleResponse>),
        (status = 404, description = "No such role"),
    )
)]
pub async fn get_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<RoleResponse>, AuthError> {
    let role = state.rbac.get_role(principal.user_id, id).await?;
    Ok(ApiResponse::success(role.into()))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/roles/{id}",
    tag = "roles",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = ApiResponse<RoleResponse>),
        (status = 400, description = "Validation failed or role name taken"),
        (status = 403, description = "Caller is not an admin, or the target is the admin role"),
        (status = 404, description = "No such role"),
    )
)]
pub async fn update_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateRoleRequest>,
) -> Result<ApiResponse<RoleResponse>, AuthError> {
    let update = RoleUpdate {
        name: payload.name,
        permissions: payload.permissions,
    };
    let role = state.rbac.update_role(principal.user_id, id, update).await?;
    Ok(ApiResponse::success(role.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/roles/{id}",
    tag = "roles",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role deleted", body = ApiResponse<MessageResponse>),
        (status = 403, description = "Caller is not an admin, or the role is protected"),
        (status = 404, description = "No such role"),
    )
)]
pub async fn delete_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<MessageResponse>, AuthError> {
    state.rbac.delete_role(principal.user_id, id).await?;
    Ok(ApiResponse::success(MessageResponse {
        message: "role deleted".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/roles/assign",
    tag = "roles",
    security(("bearer_auth" = [])),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = ApiResponse<AssignRoleResponse>),
        (status = 400, description = "User already holds the role"),
        (status = 404, description = "No such user or role"),
    )
)]
pub async fn assign_role(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedJson(payload): ValidatedJson<AssignRoleRequest>,
) -> Result<ApiResponse<AssignRoleResponse>, AuthError> {
    let user = state
        .rbac
        .assign_role(principal.user_id, payload.user_id, payload.role_id)
        .await?;
    Ok(ApiResponse::success(AssignRoleResponse {
        user_id: user.id,
        email: user.email,
        role: user.role.map(|r| r.name).unwrap_or_default(),
    }))
}
