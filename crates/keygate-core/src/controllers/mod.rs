use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{IdTokenVerifier, RbacService, RefreshTokenService, TokenCodec};
use crate::config::Config;
use crate::error::AuthError;
use crate::response::ApiResponse;
use crate::store::{
    RefreshTokenStorage, RoleLookup, SeaRefreshTokenStore, SeaRoleStore, SeaUserStore, UserLookup,
};
use crate::usecases::TokenLifecycle;

pub mod auth;
pub mod roles;

/// Shared application state available in all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub codec: Arc<TokenCodec>,
    pub users: Arc<dyn UserLookup>,
    pub roles: Arc<dyn RoleLookup>,
    pub refresh_tokens: Arc<dyn RefreshTokenStorage>,
    pub refresh: RefreshTokenService,
    pub rbac: RbacService,
    pub tokens: TokenLifecycle,
}

impl AppState {
    /// Wire the SeaORM stores and the services on top of `db`.
    pub fn new(
        config: Config,
        db: DatabaseConnection,
        google: Arc<dyn IdTokenVerifier>,
    ) -> Result<Self, AuthError> {
        let codec = Arc::new(TokenCodec::new(&config.jwt_secret, config.access_token_ttl)?);
        let users: Arc<dyn UserLookup> =
            Arc::new(SeaUserStore::new(db.clone(), config.store_timeout));
        let roles: Arc<dyn RoleLookup> =
            Arc::new(SeaRoleStore::new(db.clone(), config.store_timeout));
        let refresh_tokens: Arc<dyn RefreshTokenStorage> =
            Arc::new(SeaRefreshTokenStore::new(db.clone(), config.store_timeout));

        let refresh =
            RefreshTokenService::new(refresh_tokens.clone(), config.refresh_token_ttl);
        let rbac = RbacService::new(roles.clone(), users.clone());
        let tokens = TokenLifecycle::new(
            users.clone(),
            roles.clone(),
            codec.clone(),
            refresh.clone(),
            google,
        );

        Ok(AppState {
            config: Arc::new(config),
            db,
            codec,
            users,
            roles,
            refresh_tokens,
            refresh,
            rbac,
            tokens,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is up", body = ApiResponse<HealthResponse>))
)]
pub async fn health() -> ApiResponse<HealthResponse> {
    ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// All API routes. State is attached by [`crate::App::router`].
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/auth", auth::routes(state))
        .nest("/api/v1/admin", roles::routes(state))
}
