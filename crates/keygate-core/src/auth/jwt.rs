use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{User, ADMIN_ROLE, WILDCARD_PERMISSION};
use crate::error::AuthError;

/// JWT claims payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
pub struct AccessClaims {
    /// Subject (user ID)
    #[serde(default)]
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
    /// Role name, present only when the user holds a role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Permission names of the role; `["*"]` for admin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

impl AccessClaims {
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        if self.sub.is_empty() {
            return Err(AuthError::TokenInvalid("token has no subject".into()));
        }
        Uuid::parse_str(&self.sub)
            .map_err(|_| AuthError::TokenInvalid("subject is not a valid user id".into()))
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    /// Same rule as [`crate::domain::Role::has_permission`], evaluated on the
    /// signed claims alone.
    pub fn has_permission(&self, permission: &str) -> bool {
        if self.has_role(ADMIN_ROLE) {
            return true;
        }
        self.permissions
            .iter()
            .flatten()
            .any(|p| p == permission || p == WILDCARD_PERMISSION)
    }
}

/// Signs and verifies access tokens with a single HMAC-SHA256 secret.
///
/// The secret is injected once; nothing here reads the environment.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    /// Same rules with signature checking off; only used to tell an expired
    /// token apart once its signature has already failed.
    expiry_probe: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Fails with [`AuthError::Config`] when the secret is empty.
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::Config("JWT signing secret is not configured".into()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);
        let mut expiry_probe = validation.clone();
        expiry_probe.insecure_disable_signature_validation();

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            expiry_probe,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Build and sign claims for `user`. Role and permission claims are
    /// embedded only when the user holds a role.
    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let exp = i64::try_from(self.ttl.as_secs())
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| {
                AuthError::Config(format!("access token ttl {:?} is too large", self.ttl))
            })?;
        let claims = AccessClaims {
            sub: user.id.to_string(),
            exp,
            iat: now,
            role: user.role.as_ref().map(|r| r.name.clone()),
            permissions: user.role.as_ref().map(|r| r.claim_permissions()),
        };
        self.sign(&claims)
    }

    /// Sign arbitrary claims. [`TokenCodec::issue`] is the normal entry point.
    pub fn sign(&self, claims: &AccessClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("failed to sign token: {e}")))
    }

    /// Verify signature, algorithm and expiry, then check the subject.
    ///
    /// A token whose `exp` has passed is `TokenExpired` even when its
    /// signature is also bad.
    pub fn parse(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let header = decode_header(token).map_err(|_| match raw_header_alg(token) {
            Some(alg) if alg != "HS256" => {
                AuthError::TokenInvalid(format!("unexpected signing algorithm {alg}"))
            }
            _ => AuthError::TokenMalformed,
        })?;
        if header.alg != Algorithm::HS256 {
            return Err(AuthError::TokenInvalid(format!(
                "unexpected signing algorithm {:?}",
                header.alg
            )));
        }

        let data = match decode::<AccessClaims>(token, &self.decoding, &self.validation) {
            Ok(data) => data,
            Err(e)
                if matches!(e.kind(), ErrorKind::InvalidSignature) && self.is_past_exp(token) =>
            {
                return Err(AuthError::TokenExpired);
            }
            Err(e) => return Err(classify(e)),
        };
        data.claims.user_id()?;
        Ok(data.claims)
    }

    fn is_past_exp(&self, token: &str) -> bool {
        matches!(
            decode::<AccessClaims>(token, &self.decoding, &self.expiry_probe),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature)
        )
    }
}

/// `alg` of a header jsonwebtoken refused to decode, e.g. `none`.
fn raw_header_alg(token: &str) -> Option<String> {
    let segment = token.split('.').next()?;
    let bytes = URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()?;
    let header: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    header.get("alg")?.as_str().map(str::to_owned)
}

fn classify(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::TokenMalformed,
        ErrorKind::InvalidSignature => AuthError::TokenInvalid("signature mismatch".into()),
        ErrorKind::InvalidAlgorithm => {
            AuthError::TokenInvalid("unexpected signing algorithm".into())
        }
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::TokenInvalid(format!("missing required claim '{claim}'"))
        }
        other => AuthError::TokenInvalid(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    fn codec() -> TokenCodec {
        TokenCodec::new("unit-test-secret", Duration::from_secs(600)).unwrap()
    }

    #[test]
    fn empty_secret_is_a_config_error() {
        let err = TokenCodec::new("", Duration::from_secs(60)).unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn claims_permission_rules() {
        let user = User::new("m@example.com", None).with_role(Some(Role::moderator()));
        let claims = codec().parse(&codec().issue(&user).unwrap()).unwrap();
        assert!(claims.has_role("moderator"));
        assert!(claims.has_permission("posts:delete"));
        assert!(!claims.has_permission("roles:write"));

        let no_role = AccessClaims {
            sub: Uuid::new_v4().to_string(),
            exp: 0,
            iat: 0,
            role: None,
            permissions: None,
        };
        assert!(!no_role.has_permission("posts:read"));
    }

    #[test]
    fn subject_must_be_a_uuid() {
        let codec = codec();
        let claims = AccessClaims {
            sub: "42".into(),
            exp: Utc::now().timestamp() + 60,
            iat: Utc::now().timestamp(),
            role: None,
            permissions: None,
        };
        let token = codec.sign(&claims).unwrap();
        assert!(matches!(codec.parse(&token), Err(AuthError::TokenInvalid(_))));
    }

    #[test]
    fn expiry_wins_over_bad_signature() {
        let foreign = TokenCodec::new("other-secret", Duration::from_secs(60)).unwrap();
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: Uuid::new_v4().to_string(),
            exp: now - 10,
            iat: now - 70,
            role: None,
            permissions: None,
        };
        let token = foreign.sign(&claims).unwrap();
        assert!(matches!(codec().parse(&token), Err(AuthError::TokenExpired)));

        let fresh = foreign
            .sign(&AccessClaims { exp: now + 60, ..claims })
            .unwrap();
        assert!(matches!(codec().parse(&fresh), Err(AuthError::TokenInvalid(_))));
    }

    #[test]
    fn oversized_ttl_fails_instead_of_overflowing() {
        let user = User::new("t@example.com", None);
        for secs in [i64::MAX as u64, u64::MAX] {
            let codec = TokenCodec::new("unit-test-secret", Duration::from_secs(secs)).unwrap();
            assert!(matches!(codec.issue(&user), Err(AuthError::Config(_))));
        }
    }

    #[test]
    fn raw_header_alg_reads_unknown_algorithms() {
        // {"alg":"none","typ":"JWT"}
        assert_eq!(
            raw_header_alg("eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.e30.").as_deref(),
            Some("none")
        );
        assert_eq!(raw_header_alg("not base64!.x.y"), None);
        // {"typ":"JWT"}
        assert_eq!(raw_header_alg("eyJ0eXAiOiJKV1QifQ.e30."), None);
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(codec().parse("not-a-jwt"), Err(AuthError::TokenMalformed)));
        assert!(matches!(codec().parse(""), Err(AuthError::TokenMalformed)));
    }
}
