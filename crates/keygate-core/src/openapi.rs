use utoipa::OpenApi;

use crate::controllers::auth::{
    GoogleLoginRequest, LoginRequest, LogoutAllResponse, MessageResponse, RefreshRequest,
    RegisterRequest,
};
use crate::controllers::roles::{
    AssignRoleRequest, AssignRoleResponse, CreateRoleRequest, RoleResponse, UpdateRoleRequest,
};
use crate::controllers::HealthResponse;
use crate::error::{ErrorDetail, FieldError};
use crate::usecases::{RefreshResponse, TokenResponse};

/// OpenAPI document served at `/api-docs`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "keygate API",
        version = "0.1.0",
        description = "Token lifecycle and role-based access control."
    ),
    paths(
        crate::controllers::health,
        crate::controllers::auth::register,
        crate::controllers::auth::login,
        crate::controllers::auth::login_google,
        crate::controllers::auth::refresh,
        crate::controllers::auth::logout,
        crate::controllers::auth::logout_all,
        crate::controllers::roles::list_roles,
        crate::controllers::roles::create_role,
        crate::controllers::roles::get_role,
        crate::controllers::roles::update_role,
        crate::controllers::roles::delete_role,
        crate::controllers::roles::assign_role,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            GoogleLoginRequest,
            RefreshRequest,
            TokenResponse,
            RefreshResponse,
            MessageResponse,
            LogoutAllResponse,
            CreateRoleRequest,
            UpdateRoleRequest,
            AssignRoleRequest,
            RoleResponse,
            AssignRoleResponse,
            HealthResponse,
            ErrorDetail,
            FieldError,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and token lifecycle"),
        (name = "roles", description = "Role administration (admin only)"),
        (name = "health", description = "Liveness")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Add the JWT bearer security scheme to the document.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}
