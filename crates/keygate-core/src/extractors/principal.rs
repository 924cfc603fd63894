use axum::{extract::FromRequestParts, http::request::Parts};

use crate::auth::middleware::Principal;
use crate::error::AuthError;

/// Hands the identity attached by [`crate::auth::require_auth`] to a handler.
///
/// ```rust,ignore
/// async fn logout_all(principal: Principal) -> Result<ApiResponse<()>, AuthError> {
///     // principal.user_id is the authenticated user
/// }
/// ```
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AuthError::MissingToken("request is not authenticated".to_string()))
    }
}
