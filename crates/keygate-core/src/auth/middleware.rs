//! Authorization gates for route-level access control.
//!
//! A request passes through up to two stages:
//!
//! ```text
//! no token ─────────────────────────────→ Denied(MissingToken)      401
//! token ──→ TokenCodec::parse ──✗──────→ Denied(Expired|Malformed|Invalid) 401
//!                 │ ok
//!                 ▼
//!          Authorized(Principal) ──→ role / permission gate ──✗──→ Denied 403
//!                                            │ ok
//!                                            ▼
//!                                         handler
//! ```
//!
//! Gates only look at the signed claims. A user whose refresh tokens were
//! revoked or whose role changed keeps their current access token until it
//! expires.
//!
//! # Usage
//!
//! ```rust,ignore
//! use keygate_core::auth::middleware::{require_auth, require_permission, require_role};
//!
//! Router::new()
//!     .route("/admin/roles", get(list_roles))
//!     .route_layer(axum::middleware::from_fn(require_role("admin")))
//!     .route_layer(axum::middleware::from_fn_with_state(codec.clone(), require_auth))
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::auth::jwt::{AccessClaims, TokenCodec};
use crate::domain::{ADMIN_ROLE, WILDCARD_PERMISSION};
use crate::error::AuthError;

/// Identity attached to the request once its bearer token verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Option<String>,
    pub permissions: Vec<String>,
}

impl Principal {
    pub fn from_claims(claims: &AccessClaims) -> Result<Self, AuthError> {
        Ok(Self {
            user_id: claims.user_id()?,
            role: claims.role.clone(),
            permissions: claims.permissions.clone().unwrap_or_default(),
        })
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.has_role(ADMIN_ROLE)
            || self
                .permissions
                .iter()
                .any(|p| p == permission || p == WILDCARD_PERMISSION)
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    MissingToken(&'static str),
    Expired,
    Malformed,
    Invalid(String),
    MissingRole(String),
    MissingPermission(String),
}

impl From<DenialReason> for AuthError {
    fn from(reason: DenialReason) -> Self {
        match reason {
            DenialReason::MissingToken(msg) => AuthError::MissingToken(msg.to_string()),
            DenialReason::Expired => AuthError::TokenExpired,
            DenialReason::Malformed => AuthError::TokenMalformed,
            DenialReason::Invalid(msg) => AuthError::TokenInvalid(msg),
            DenialReason::MissingRole(role) => {
                AuthError::PermissionDenied(format!("role '{role}' required"))
            }
            DenialReason::MissingPermission(permission) => {
                AuthError::PermissionDenied(format!("permission '{permission}' required"))
            }
        }
    }
}

/// Outcome of running a request through the gates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Authorized(Principal),
    Denied(DenialReason),
}

impl AuthDecision {
    /// Token gate: read the bearer token from `headers` and verify it.
    pub fn from_headers(codec: &TokenCodec, headers: &HeaderMap) -> Self {
        let Some(value) = headers.get(header::AUTHORIZATION) else {
            return AuthDecision::Denied(DenialReason::MissingToken(
                "authorization header required",
            ));
        };
        let Some(token) = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().split_once(' '))
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
            .map(|(_, token)| token.trim())
            .filter(|t| !t.is_empty())
        else {
            return AuthDecision::Denied(DenialReason::MissingToken("bearer token required"));
        };
        Self::from_token(codec, token)
    }

    pub fn from_token(codec: &TokenCodec, token: &str) -> Self {
        match codec.parse(token).and_then(|claims| Principal::from_claims(&claims)) {
            Ok(principal) => AuthDecision::Authorized(principal),
            Err(AuthError::TokenExpired) => AuthDecision::Denied(DenialReason::Expired),
            Err(AuthError::TokenMalformed) => AuthDecision::Denied(DenialReason::Malformed),
            Err(AuthError::TokenInvalid(msg)) => AuthDecision::Denied(DenialReason::Invalid(msg)),
            Err(other) => AuthDecision::Denied(DenialReason::Invalid(other.to_string())),
        }
    }

    /// Role gate. A denial passes through unchanged.
    pub fn require_role(self, role: &str) -> Self {
        match self {
            AuthDecision::Authorized(p) if !p.has_role(role) => {
                AuthDecision::Denied(DenialReason::MissingRole(role.to_string()))
            }
            other => other,
        }
    }

    /// Permission gate. A denial passes through unchanged.
    pub fn require_permission(self, permission: &str) -> Self {
        match self {
            AuthDecision::Authorized(p) if !p.has_permission(permission) => {
                AuthDecision::Denied(DenialReason::MissingPermission(permission.to_string()))
            }
            other => other,
        }
    }

    pub fn into_result(self) -> Result<Principal, AuthError> {
        match self {
            AuthDecision::Authorized(principal) => Ok(principal),
            AuthDecision::Denied(reason) => Err(reason.into()),
        }
    }
}

type GateFuture = Pin<Box<dyn Future<Output = Result<Response, AuthError>> + Send>>;

/// Token gate as middleware. Attaches the [`Principal`] to the request.
///
/// ```rust,ignore
/// .route_layer(axum::middleware::from_fn_with_state(codec, require_auth))
/// ```
pub async fn require_auth(
    State(codec): State<Arc<TokenCodec>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let principal = AuthDecision::from_headers(&codec, req.headers())
        .into_result()
        .inspect_err(|e| tracing::debug!(error = %e, "bearer token rejected"))?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

fn attached(req: &Request) -> AuthDecision {
    match req.extensions().get::<Principal>() {
        Some(principal) => AuthDecision::Authorized(principal.clone()),
        None => AuthDecision::Denied(DenialReason::MissingToken("request is not authenticated")),
    }
}

/// Role gate as middleware. Must sit inside [`require_auth`].
pub fn require_role(
    role: &'static str,
) -> impl Fn(Request, Next) -> GateFuture + Clone + Send + Sync + 'static {
    move |req: Request, next: Next| {
        Box::pin(async move {
            attached(&req).require_role(role).into_result()?;
            Ok(next.run(req).await)
        })
    }
}

/// Permission gate as middleware. Must sit inside [`require_auth`].
pub fn require_permission(
    permission: &'static str,
) -> impl Fn(Request, Next) -> GateFuture + Clone + Send + Sync + 'static {
    move |req: Request, next: Next| {
        Box::pin(async move {
            attached(&req).require_permission(permission).into_result()?;
            Ok(next.run(req).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::time::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new("middleware-secret", Duration::from_secs(300)).unwrap()
    }

    fn principal(role: Option<&str>, permissions: &[&str]) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            role: role.map(Into::into),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn missing_header_is_missing_token() {
        let decision = AuthDecision::from_headers(&codec(), &HeaderMap::new());
        assert!(matches!(decision, AuthDecision::Denied(DenialReason::MissingToken(_))));
    }

    #[test]
    fn non_bearer_scheme_is_missing_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        let err = AuthDecision::from_headers(&codec(), &headers).into_result().unwrap_err();
        assert!(matches!(err, AuthError::MissingToken(_)));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let codec = codec();
        let token = codec.issue(&crate::domain::User::new("c@example.com", None)).unwrap();
        for scheme in ["bearer", "BEARER", "Bearer"] {
            let mut headers = HeaderMap::new();
            let value = HeaderValue::from_str(&format!("{scheme} {token}")).unwrap();
            headers.insert(header::AUTHORIZATION, value);
            let decision = AuthDecision::from_headers(&codec, &headers);
            assert!(matches!(decision, AuthDecision::Authorized(_)), "{scheme} rejected");
        }
    }

    #[test]
    fn garbage_token_is_malformed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(
            AuthDecision::from_headers(&codec(), &headers),
            AuthDecision::Denied(DenialReason::Malformed)
        );
    }

    #[test]
    fn gates_compose_and_keep_first_denial() {
        let moderator = AuthDecision::Authorized(principal(Some("moderator"), &["posts:delete"]));
        assert!(matches!(
            moderator.clone().require_permission("posts:delete"),
            AuthDecision::Authorized(_)
        ));
        assert_eq!(
            moderator.clone().require_role("admin"),
            AuthDecision::Denied(DenialReason::MissingRole("admin".into()))
        );
        assert_eq!(
            moderator.require_role("admin").require_permission("nope"),
            AuthDecision::Denied(DenialReason::MissingRole("admin".into()))
        );
    }

    #[test]
    fn admin_and_wildcard_pass_permission_gate() {
        let admin = AuthDecision::Authorized(principal(Some("admin"), &[]));
        assert!(admin.require_permission("anything").into_result().is_ok());

        let ops = AuthDecision::Authorized(principal(Some("ops"), &["*"]));
        assert!(ops.require_permission("servers:reboot").into_result().is_ok());

        let anonymous_role = AuthDecision::Authorized(principal(None, &[]));
        let err = anonymous_role.require_permission("posts:read").into_result().unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied(_)));
    }
}
