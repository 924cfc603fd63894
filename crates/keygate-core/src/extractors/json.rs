use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::AuthError;

/// Request bodies larger than this are rejected.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// JSON body extractor that reports failures through [`AuthError`], so a bad
/// body produces the same envelope as every other error.
///
/// ```rust,ignore
/// async fn logout(Json(payload): Json<LogoutRequest>) -> impl IntoResponse { ... }
/// ```
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| AuthError::Validation(format!("failed to read body: {e}")))?;

        let value: T = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::Validation(format!("invalid JSON: {e}")))?;

        Ok(Json(value))
    }
}

/// [`Json`] followed by the body's `validator` rules. Field failures come
/// back as [`AuthError::ValidationErrors`].
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}
