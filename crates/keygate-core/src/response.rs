use axum::http::StatusCode;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ErrorDetail;

/// Standard API response wrapper.
///
/// Every keygate endpoint answers with this envelope:
/// ```json
/// {
///   "success": true,
///   "data": { ... }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(skip)]
    pub status: Option<StatusCode>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful response with data.
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            status: None,
        }
    }

    /// Create a `201 Created` response with data.
    pub fn created(data: T) -> Self {
        ApiResponse {
            status: Some(StatusCode::CREATED),
            ..Self::success(data)
        }
    }
}

impl<T: Serialize> axum::response::IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        let status = self.status.unwrap_or(if self.success {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        });
        (status, axum::Json(self)).into_response()
    }
}
