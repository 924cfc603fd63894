use axum::extract::State;
use axum::middleware::from_fn_with_state;
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::{require_auth, Principal};
use crate::error::AuthError;
use crate::extractors::ValidatedJson;
use crate::response::ApiResponse;
use crate::usecases::{RefreshResponse, TokenResponse};

use super::AppState;

// ── Request / Response types ──

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "must be between 8 and 128 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GoogleLoginRequest {
    /// ID token obtained by the client from Google Sign-In
    #[validate(length(min = 1, message = "is required"))]
    pub id_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutAllResponse {
    pub message: String,
    /// Number of refresh tokens that were still active
    pub revoked: u64,
}

// ── Routes ──

pub fn routes(state: &AppState) -> Router<AppState> {
    let authenticated = Router::new()
        .route("/logout-all", post(logout_all))
        .route_layer(from_fn_with_state(state.codec.clone(), require_auth));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/login/google", post(login_google))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .merge(authenticated)
}

// ── Handlers ──

/// Create an account with email and password.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<TokenResponse>),
        (status = 400, description = "Validation failed or email already registered"),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<ApiResponse<TokenResponse>, AuthError> {
    let tokens = state.tokens.register(&payload.email, &payload.password).await?;
    Ok(ApiResponse::created(tokens))
}

/// Exchange email and password for a token pair.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = ApiResponse<TokenResponse>),
        (status = 401, description = "Invalid email or password"),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<ApiResponse<TokenResponse>, AuthError> {
    let tokens = state.tokens.login(&payload.email, &payload.password).await?;
    Ok(ApiResponse::success(tokens))
}

/// Exchange a Google ID token for a token pair.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login/google",
    tag = "auth",
    request_body = GoogleLoginRequest,
    responses(
        (status = 200, description = "Logged in", body = ApiResponse<TokenResponse>),
        (status = 401, description = "Google rejected the token"),
        (status = 502, description = "Google could not be reached"),
    )
)]
pub async fn login_google(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<GoogleLoginRequest>,
) -> Result<ApiResponse<TokenResponse>, AuthError> {
    let tokens = state.tokens.login_with_google(&payload.id_token).await?;
    Ok(ApiResponse::success(tokens))
}

/// Rotate a refresh token. The presented token stops working.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = ApiResponse<RefreshResponse>),
        (status = 401, description = "Refresh token is invalid or expired"),
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RefreshRequest>,
) -> Result<ApiResponse<RefreshResponse>, AuthError> {
    let tokens = state.tokens.refresh(&payload.refresh_token).await?;
    Ok(ApiResponse::success(tokens))
}

/// Revoke a single refresh token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token revoked", body = ApiResponse<MessageResponse>),
        (status = 401, description = "Refresh token is invalid or expired"),
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RefreshRequest>,
) -> Result<ApiResponse<MessageResponse>, AuthError> {
    state.tokens.logout(&payload.refresh_token).await?;
    Ok(ApiResponse::success(MessageResponse {
        message: "logged out".to_string(),
    }))
}

/// Revoke every refresh token of the caller.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout-all",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All sessions revoked", body = ApiResponse<LogoutAllResponse>),
        (status = 401, description = "Missing or invalid access token"),
    )
)]
pub async fn logout_all(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<ApiResponse<LogoutAllResponse>, AuthError> {
    let revoked = state.tokens.logout_all(principal.user_id).await?;
    Ok(ApiResponse::success(LogoutAllResponse {
        message: "logged out everywhere".to_string(),
        revoked,
    }))
}
