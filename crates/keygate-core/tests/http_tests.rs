use axum::http::{HeaderMap, HeaderValue};
use keygate_core::store::RoleLookup;
use keygate_core::TestApp;
use serde_json::json;

const PASSWORD: &str = "pw12345678";

// ═══ Health / docs ═══

#[tokio::test]
async fn test_health_and_request_id() {
    let app = TestApp::new().await;
    let res = app.client.get(&app.url("/health")).await;

    assert_eq!(res.status, 200);
    assert!(res.is_success());
    assert_eq!(res.data()["status"], "ok");
    assert!(res.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = TestApp::new().await;
    let res = app.client.get(&app.url("/api-docs/openapi.json")).await;

    assert_eq!(res.status, 200);
    let doc = res.json();
    assert!(doc["paths"]["/api/v1/auth/register"].is_object());
    assert!(doc["paths"]["/api/v1/admin/roles/{id}"].is_object());
    assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
}

// ═══ Register / login ═══

#[tokio::test]
async fn test_register_returns_created_pair() {
    let app = TestApp::new().await;
    let data = app.register("alice@example.com", PASSWORD).await;

    assert!(data["access_token"].as_str().is_some());
    assert_eq!(data["refresh_token"].as_str().unwrap().len(), 64);
    assert_eq!(data["token_type"], "Bearer");
    assert_eq!(data["expires_in"], 900);
}

#[tokio::test]
async fn test_register_validation_errors() {
    let app = TestApp::new().await;
    let body = json!({ "email": "not-an-email", "password": "short" });
    let res = app
        .client
        .post(&app.url("/api/v1/auth/register"), &body.to_string())
        .await;

    assert_eq!(res.status, 400);
    assert!(!res.is_success());
    assert_eq!(res.error_code(), "VALIDATION_ERROR");
    let fields = res.error()["fields"].as_array().unwrap().clone();
    let names: Vec<_> = fields.iter().map(|f| f["field"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["email", "password"]);
}

#[tokio::test]
async fn test_register_rejects_bad_json() {
    let app = TestApp::new().await;
    let res = app
        .client
        .post(&app.url("/api/v1/auth/register"), "{not json")
        .await;
    assert_eq!(res.status, 400);
    assert_eq!(res.error_code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_register_duplicate_is_conflict() {
    let app = TestApp::new().await;
    app.register("alice@example.com", PASSWORD).await;

    let body = json!({ "email": "alice@example.com", "password": PASSWORD });
    let res = app
        .client
        .post(&app.url("/api/v1/auth/register"), &body.to_string())
        .await;
    assert_eq!(res.status, 400);
    assert_eq!(res.error_code(), "CONFLICT");
}

#[tokio::test]
async fn test_login_wrong_password_is_unauthorized() {
    let app = TestApp::new().await;
    app.register("alice@example.com", PASSWORD).await;

    let body = json!({ "email": "alice@example.com", "password": "wrong-password" });
    let res = app
        .client
        .post(&app.url("/api/v1/auth/login"), &body.to_string())
        .await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error_code(), "UNAUTHORIZED");

    let data = app.login("alice@example.com", PASSWORD).await;
    assert!(data["access_token"].as_str().is_some());
}

#[tokio::test]
async fn test_google_login() {
    let app = TestApp::new().await;

    let body = json!({ "id_token": "valid:gina@example.com" });
    let res = app
        .client
        .post(&app.url("/api/v1/auth/login/google"), &body.to_string())
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    assert!(res.data()["refresh_token"].as_str().is_some());

    let body = json!({ "id_token": "forged" });
    let res = app
        .client
        .post(&app.url("/api/v1/auth/login/google"), &body.to_string())
        .await;
    assert_eq!(res.status, 401);
}

// ═══ Refresh / logout ═══

#[tokio::test]
async fn test_refresh_rotation_over_http() {
    let app = TestApp::new().await;
    let data = app.register("alice@example.com", PASSWORD).await;
    let old = data["refresh_token"].as_str().unwrap().to_string();

    let body = json!({ "refresh_token": old });
    let res = app
        .client
        .post(&app.url("/api/v1/auth/refresh"), &body.to_string())
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    let renewed = res.data();
    assert_ne!(renewed["refresh_token"].as_str().unwrap(), old);
    assert!(renewed["expires_at"].as_str().is_some());

    let replay = app
        .client
        .post(&app.url("/api/v1/auth/refresh"), &body.to_string())
        .await;
    assert_eq!(replay.status, 401);
    assert_eq!(replay.error_code(), "UNAUTHORIZED");
}

#[tokio::test]
async fn test_logout_then_refresh_fails() {
    let app = TestApp::new().await;
    let data = app.register("alice@example.com", PASSWORD).await;
    let body = json!({ "refresh_token": data["refresh_token"] }).to_string();

    let res = app.client.post(&app.url("/api/v1/auth/logout"), &body).await;
    assert_eq!(res.status, 200);

    let res = app.client.post(&app.url("/api/v1/auth/refresh"), &body).await;
    assert_eq!(res.status, 401);
}

#[tokio::test]
async fn test_logout_all_requires_bearer_token() {
    let app = TestApp::new().await;
    let res = app
        .client
        .post(&app.url("/api/v1/auth/logout-all"), "{}")
        .await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error_code(), "MISSING_TOKEN");
}

#[tokio::test]
async fn test_logout_all_revokes_sessions() {
    let app = TestApp::new().await;
    let first = app.register("alice@example.com", PASSWORD).await;
    let second = app.login("alice@example.com", PASSWORD).await;
    let token = second["access_token"].as_str().unwrap();

    let res = app
        .client
        .post_with_auth(&app.url("/api/v1/auth/logout-all"), token, "{}")
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    assert_eq!(res.data()["revoked"], 2);

    for data in [first, second] {
        let body = json!({ "refresh_token": data["refresh_token"] }).to_string();
        let res = app.client.post(&app.url("/api/v1/auth/refresh"), &body).await;
        assert_eq!(res.status, 401);
    }
}

// ═══ Admin routes ═══

#[tokio::test]
async fn test_admin_routes_need_token_and_admin_role() {
    let app = TestApp::new().await;
    app.admin_token("root@example.com", PASSWORD).await;
    let user = app.register("bob@example.com", PASSWORD).await;
    let user_token = user["access_token"].as_str().unwrap();

    let res = app.client.get(&app.url("/api/v1/admin/roles")).await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error_code(), "MISSING_TOKEN");

    let mut headers = HeaderMap::new();
    headers.insert("Authorization", HeaderValue::from_static("Basic Ym9iOnB3"));
    let res = app
        .client
        .get_with_headers(&app.url("/api/v1/admin/roles"), headers)
        .await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error_code(), "MISSING_TOKEN");

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/admin/roles"), "not.a.jwt")
        .await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error_code(), "TOKEN_MALFORMED");

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/admin/roles"), user_token)
        .await;
    assert_eq!(res.status, 403);
    assert_eq!(res.error_code(), "PERMISSION_DENIED");
}

#[tokio::test]
async fn test_admin_role_crud() {
    let app = TestApp::new().await;
    let token = app.admin_token("root@example.com", PASSWORD).await;

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/admin/roles"), &token)
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    let roles = res.data();
    let admin = roles
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "admin")
        .unwrap()
        .clone();
    assert_eq!(admin["permissions"], json!(["*"]));

    let body = json!({ "name": "editor", "permissions": ["posts:write"] });
    let res = app
        .client
        .post_with_auth(&app.url("/api/v1/admin/roles"), &token, &body.to_string())
        .await;
    assert_eq!(res.status, 201, "{}", res.body);
    let id = res.data()["id"].as_str().unwrap().to_string();
    let role_url = app.url(&format!("/api/v1/admin/roles/{id}"));

    let res = app
        .client
        .post_with_auth(&app.url("/api/v1/admin/roles"), &token, &body.to_string())
        .await;
    assert_eq!(res.status, 400);
    assert_eq!(res.error_code(), "CONFLICT");

    let body = json!({ "permissions": ["posts:write", "posts:publish"] });
    let res = app
        .client
        .put_with_auth(&role_url, &token, &body.to_string())
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    assert_eq!(res.data()["permissions"], json!(["posts:write", "posts:publish"]));

    let res = app.client.get_with_auth(&role_url, &token).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.data()["name"], "editor");

    let res = app.client.delete_with_auth(&role_url, &token).await;
    assert_eq!(res.status, 200);

    let res = app.client.get_with_auth(&role_url, &token).await;
    assert_eq!(res.status, 404);
    assert_eq!(res.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_admin_role_is_protected_over_http() {
    let app = TestApp::new().await;
    let token = app.admin_token("root@example.com", PASSWORD).await;
    let admin_role = app.user("root@example.com").await.role.unwrap();
    let url = app.url(&format!("/api/v1/admin/roles/{}", admin_role.id));

    let res = app
        .client
        .put_with_auth(&url, &token, &json!({ "name": "root" }).to_string())
        .await;
    assert_eq!(res.status, 403);
    assert_eq!(res.error_code(), "FORBIDDEN");

    let res = app.client.delete_with_auth(&url, &token).await;
    assert_eq!(res.status, 403);
    assert_eq!(res.error_code(), "FORBIDDEN");
}

#[tokio::test]
async fn test_assign_role_over_http() {
    let app = TestApp::new().await;
    let token = app.admin_token("root@example.com", PASSWORD).await;
    app.register("bob@example.com", PASSWORD).await;
    let bob = app.user("bob@example.com").await;
    let moderator = app
        .state
        .roles
        .find_by_name("moderator")
        .await
        .unwrap()
        .unwrap();

    let body = json!({ "user_id": bob.id, "role_id": moderator.id }).to_string();
    let res = app
        .client
        .post_with_auth(&app.url("/api/v1/admin/roles/assign"), &token, &body)
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    assert_eq!(res.data()["role"], "moderator");
    assert_eq!(res.data()["email"], "bob@example.com");

    let res = app
        .client
        .post_with_auth(&app.url("/api/v1/admin/roles/assign"), &token, &body)
        .await;
    assert_eq!(res.status, 400);
    assert_eq!(res.error_code(), "CONFLICT");

    let data = app.login("bob@example.com", PASSWORD).await;
    let claims = app
        .state
        .codec
        .parse(data["access_token"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.role.as_deref(), Some("moderator"));
}
