use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::response::ApiResponse;

/// Error taxonomy shared by the token codec, the stores, the RBAC service and
/// the HTTP boundary.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or unusable process configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing token: {0}")]
    MissingToken(String),

    #[error("token is malformed")]
    TokenMalformed,

    #[error("token has expired")]
    TokenExpired,

    #[error("token is invalid: {0}")]
    TokenInvalid(String),

    /// Credentials or an opaque refresh token were rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("validation errors")]
    ValidationErrors(Vec<FieldError>),

    /// The acting principal lacks the privileges for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The operation targets a protected resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("storage error while trying to {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: sea_orm::DbErr,
    },

    #[error("storage call timed out while trying to {0}")]
    Timeout(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Wrap a persistence failure with the operation that produced it.
    pub fn storage(context: impl Into<String>, source: sea_orm::DbErr) -> Self {
        AuthError::Storage {
            context: context.into(),
            source,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken(_)
            | AuthError::TokenMalformed
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_)
            | AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::PermissionDenied(_) | AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::Conflict(_)
            | AuthError::Validation(_)
            | AuthError::ValidationErrors(_) => StatusCode::BAD_REQUEST,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AuthError::Config(_)
            | AuthError::Storage { .. }
            | AuthError::Timeout(_)
            | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Config(_) => "CONFIG_ERROR",
            AuthError::MissingToken(_) => "MISSING_TOKEN",
            AuthError::TokenMalformed => "TOKEN_MALFORMED",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenInvalid(_) => "TOKEN_INVALID",
            AuthError::Unauthorized(_) => "UNAUTHORIZED",
            AuthError::NotFound(_) => "NOT_FOUND",
            AuthError::Conflict(_) => "CONFLICT",
            AuthError::Validation(_) | AuthError::ValidationErrors(_) => "VALIDATION_ERROR",
            AuthError::PermissionDenied(_) => "PERMISSION_DENIED",
            AuthError::Forbidden(_) => "FORBIDDEN",
            AuthError::Storage { .. } => "STORAGE_ERROR",
            AuthError::Timeout(_) => "TIMEOUT",
            AuthError::Upstream(_) => "UPSTREAM_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to hand to a client. Server-side failures are reduced to
    /// their code so storage details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AuthError::ValidationErrors(errs) => errs
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; "),
            AuthError::Config(_)
            | AuthError::Storage { .. }
            | AuthError::Timeout(_)
            | AuthError::Internal(_) => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed '{}' check", e.code));
                    FieldError::with_code(field.to_string(), message, e.code.to_string())
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        AuthError::ValidationErrors(fields)
    }
}

/// Error detail for API responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

/// Field-level validation error.
///
/// ```json
/// {
///   "field": "email",
///   "message": "must be a valid email address",
///   "code": "email"
/// }
/// ```
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

impl axum::response::IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        } else {
            tracing::debug!(error = %self, code = self.error_code(), "request rejected");
        }

        let fields = match &self {
            AuthError::ValidationErrors(errs) => Some(errs.clone()),
            _ => None,
        };
        let body: ApiResponse<()> = ApiResponse {
            success: false,
            data: None,
            error: Some(ErrorDetail {
                code: self.error_code().to_string(),
                message: self.public_message(),
                fields,
            }),
            status: None,
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_map_to_unauthorized() {
        for err in [
            AuthError::MissingToken("none".into()),
            AuthError::TokenMalformed,
            AuthError::TokenExpired,
            AuthError::TokenInvalid("bad signature".into()),
        ] {
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn denials_map_to_forbidden() {
        assert_eq!(
            AuthError::PermissionDenied("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AuthError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn conflict_is_a_bad_request() {
        let err = AuthError::Conflict("role exists".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[test]
    fn storage_errors_hide_details_from_clients() {
        let err = AuthError::storage("find role", sea_orm::DbErr::Custom("disk on fire".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "internal server error");
        assert!(err.to_string().contains("find role"));
    }

    #[test]
    fn expired_and_malformed_have_distinct_codes() {
        assert_eq!(AuthError::TokenExpired.error_code(), "TOKEN_EXPIRED");
        assert_eq!(AuthError::TokenMalformed.error_code(), "TOKEN_MALFORMED");
        assert_eq!(AuthError::TokenInvalid(String::new()).error_code(), "TOKEN_INVALID");
    }
}
