pub mod google;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod rbac;
pub mod refresh;

pub use google::{GoogleIdentity, GoogleLoginDisabled, GoogleTokenInfoVerifier, IdTokenVerifier};
pub use jwt::{AccessClaims, TokenCodec};
pub use middleware::{
    require_auth, require_permission, require_role, AuthDecision, DenialReason, Principal,
};
pub use password::{hash_password, verify_password};
pub use rbac::{RbacService, RoleUpdate};
pub use refresh::{generate_secure_token, hash_token, IssuedRefreshToken, RefreshTokenService};
