use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use keygate_core::auth::{
    require_auth, require_permission, require_role, AccessClaims, Principal, TokenCodec,
};
use keygate_core::domain::{Role, User};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "middleware-test-secret";

fn codec() -> Arc<TokenCodec> {
    Arc::new(TokenCodec::new(SECRET, Duration::from_secs(300)).unwrap())
}

async fn whoami(principal: Principal) -> String {
    principal.user_id.to_string()
}

/// `/me` needs any valid token, `/posts` needs `posts:read`, `/mod` needs the
/// moderator role.
fn router(codec: Arc<TokenCodec>) -> Router {
    let posts = Router::new()
        .route("/posts", get(|| async { "posts" }))
        .route_layer(from_fn(require_permission("posts:read")));
    let moderation = Router::new()
        .route("/mod", get(|| async { "mod" }))
        .route_layer(from_fn(require_role("moderator")));

    Router::new()
        .route("/me", get(whoami))
        .merge(posts)
        .merge(moderation)
        .layer(from_fn_with_state(codec, require_auth))
}

async fn call(app: Router, path: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut req = Request::builder().uri(path);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let res = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

fn code(body: &serde_json::Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_valid_token_reaches_handler_with_principal() {
    let codec = codec();
    let user = User::new("alice@example.com", None);
    let token = codec.issue(&user).unwrap();

    let res = router(codec)
        .oneshot(
            Request::builder()
                .uri("/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes, user.id.to_string().as_bytes());
}

#[tokio::test]
async fn test_missing_token() {
    let (status, body) = call(router(codec()), "/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code(&body), "MISSING_TOKEN");
}

#[tokio::test]
async fn test_expired_token() {
    let codec = codec();
    let now = Utc::now().timestamp();
    let token = codec
        .sign(&AccessClaims {
            sub: Uuid::new_v4().to_string(),
            exp: now - 30,
            iat: now - 330,
            role: None,
            permissions: None,
        })
        .unwrap();

    let (status, body) = call(router(codec), "/me", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code(&body), "TOKEN_EXPIRED");
}

#[tokio::test]
async fn test_malformed_token() {
    let (status, body) = call(router(codec()), "/me", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code(&body), "TOKEN_MALFORMED");
}

#[tokio::test]
async fn test_token_from_other_secret() {
    let foreign = TokenCodec::new("some-other-secret", Duration::from_secs(300)).unwrap();
    let token = foreign.issue(&User::new("eve@example.com", None)).unwrap();

    let (status, body) = call(router(codec()), "/me", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code(&body), "TOKEN_INVALID");
}

#[tokio::test]
async fn test_permission_gate() {
    let codec = codec();
    let member = User::new("bob@example.com", None).with_role(Some(Role::default_user()));
    let bare = User::new("carl@example.com", None);
    let admin = User::new("root@example.com", None).with_role(Some(Role::admin()));

    let token = codec.issue(&member).unwrap();
    let (status, _) = call(router(codec.clone()), "/posts", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let token = codec.issue(&bare).unwrap();
    let (status, body) = call(router(codec.clone()), "/posts", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(code(&body), "PERMISSION_DENIED");

    let token = codec.issue(&admin).unwrap();
    let (status, _) = call(router(codec), "/posts", Some(&token)).await;
    assert_eq!(status, StatusCode::OK, "wildcard satisfies any permission");
}

#[tokio::test]
async fn test_role_gate() {
    let codec = codec();
    let moderator = User::new("mo@example.com", None).with_role(Some(Role::moderator()));
    let member = User::new("bob@example.com", None).with_role(Some(Role::default_user()));

    let token = codec.issue(&moderator).unwrap();
    let (status, _) = call(router(codec.clone()), "/mod", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let token = codec.issue(&member).unwrap();
    let (status, body) = call(router(codec), "/mod", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(code(&body), "PERMISSION_DENIED");
}
