//! Google ID-token verification.
//!
//! The production verifier asks Google's `tokeninfo` endpoint to decode and
//! check the token, then enforces the audience and the verified-email flag
//! locally. Tests swap in their own [`IdTokenVerifier`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AuthError;

pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Identity extracted from a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleIdentity {
    pub email: String,
    pub name: Option<String>,
    pub email_verified: bool,
}

#[async_trait]
pub trait IdTokenVerifier: Send + Sync {
    /// Fails with `Unauthorized` for tokens Google rejects or that were minted
    /// for another client, and `Upstream` when Google cannot be reached.
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: Option<String>,
    email: Option<String>,
    name: Option<String>,
    /// tokeninfo reports booleans as strings.
    email_verified: Option<String>,
}

impl TokenInfo {
    fn into_identity(self, client_id: &str) -> Result<GoogleIdentity, AuthError> {
        if self.aud.as_deref() != Some(client_id) {
            return Err(AuthError::Unauthorized(
                "google token was issued for another client".into(),
            ));
        }
        let email = self
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AuthError::Unauthorized("google token carries no email".into()))?;
        let email_verified = self.email_verified.as_deref() == Some("true");
        if !email_verified {
            return Err(AuthError::Unauthorized("google email is not verified".into()));
        }
        Ok(GoogleIdentity {
            email,
            name: self.name,
            email_verified,
        })
    }
}

/// [`IdTokenVerifier`] backed by the Google `tokeninfo` endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTokenInfoVerifier {
    client: reqwest::Client,
    client_id: String,
    endpoint: String,
}

impl GoogleTokenInfoVerifier {
    pub fn new(client_id: impl Into<String>) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            client_id: client_id.into(),
            endpoint: GOOGLE_TOKENINFO_URL.to_string(),
        })
    }

    /// Point at a different tokeninfo endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl IdTokenVerifier for GoogleTokenInfoVerifier {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, AuthError> {
        let res = self
            .client
            .get(&self.endpoint)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("google tokeninfo unreachable: {e}")))?;

        let status = res.status();
        if status.is_client_error() {
            return Err(AuthError::Unauthorized("invalid google token".into()));
        }
        if !status.is_success() {
            return Err(AuthError::Upstream(format!("google tokeninfo returned {status}")));
        }

        let info: TokenInfo = res
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("unreadable tokeninfo response: {e}")))?;
        info.into_identity(&self.client_id)
    }
}

/// Used when `GOOGLE_CLIENT_ID` is unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleLoginDisabled;

#[async_trait]
impl IdTokenVerifier for GoogleLoginDisabled {
    async fn verify(&self, _id_token: &str) -> Result<GoogleIdentity, AuthError> {
        Err(AuthError::Unauthorized("google login is not configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(aud: &str, email: Option<&str>, verified: &str) -> TokenInfo {
        TokenInfo {
            aud: Some(aud.into()),
            email: email.map(Into::into),
            name: Some("Alice".into()),
            email_verified: Some(verified.into()),
        }
    }

    #[test]
    fn accepts_matching_audience_with_verified_email() {
        let identity = info("client", Some("a@example.com"), "true")
            .into_identity("client")
            .unwrap();
        assert_eq!(identity.email, "a@example.com");
        assert_eq!(identity.name.as_deref(), Some("Alice"));
    }

    #[test]
    fn rejects_foreign_audience() {
        let err = info("other", Some("a@example.com"), "true")
            .into_identity("client")
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[test]
    fn rejects_unverified_or_missing_email() {
        assert!(info("client", Some("a@example.com"), "false").into_identity("client").is_err());
        assert!(info("client", None, "true").into_identity("client").is_err());
    }

    #[tokio::test]
    async fn disabled_verifier_rejects_everything() {
        let err = GoogleLoginDisabled.verify("anything").await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }
}
