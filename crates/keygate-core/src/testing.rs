use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use sea_orm::DatabaseConnection;
use tokio::net::TcpListener;

use crate::auth::{GoogleIdentity, IdTokenVerifier};
use crate::config::Config;
use crate::controllers::AppState;
use crate::domain::User;
use crate::error::AuthError;

/// Prefix understood by [`StubIdTokenVerifier`]: `valid:<email>`.
pub const STUB_GOOGLE_PREFIX: &str = "valid:";

/// ID-token verifier for tests. Accepts `valid:<email>` and rejects
/// everything else, without any network traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubIdTokenVerifier;

#[async_trait]
impl IdTokenVerifier for StubIdTokenVerifier {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, AuthError> {
        match id_token.strip_prefix(STUB_GOOGLE_PREFIX) {
            Some(email) if !email.is_empty() => Ok(GoogleIdentity {
                email: email.to_string(),
                name: None,
                email_verified: true,
            }),
            _ => Err(AuthError::Unauthorized("invalid google token".into())),
        }
    }
}

/// A test application for integration testing.
///
/// Spins up a keygate server on a random local port with an in-memory SQLite
/// database and the stub Google verifier.
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn register() {
///     let app = TestApp::new().await;
///     let res = app.client.post(&app.url("/api/v1/auth/register"), r#"{"email":"a@b.com","password":"pw12345678"}"#).await;
///     assert_eq!(res.status, 201);
/// }
/// ```
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: TestClient,
    pub db: DatabaseConnection,
    pub config: Config,
    pub state: AppState,
}

impl TestApp {
    /// In-memory database, RBAC disabled (no roles).
    pub async fn new() -> Self {
        Self::with_config(Config::for_tests()).await
    }

    /// In-memory database with the default roles seeded.
    pub async fn with_default_roles() -> Self {
        let app = Self::new().await;
        app.state
            .rbac
            .seed_default_roles()
            .await
            .expect("Failed to seed default roles");
        app
    }

    pub async fn with_config(config: Config) -> Self {
        let app = crate::App::with_verifier(config, Arc::new(StubIdTokenVerifier))
            .await
            .expect("Failed to create test app");

        app.run_migrations()
            .await
            .expect("Failed to run migrations");

        let router = app.router();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Test server failed");
        });

        TestApp {
            addr,
            client: TestClient::new(addr),
            db: app.db.clone(),
            config: app.config.clone(),
            state: app.state().clone(),
        }
    }

    /// Get the URL for a path on the test server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Register through the API and return the `data` object
    /// (`access_token`, `refresh_token`, ...).
    pub async fn register(&self, email: &str, password: &str) -> serde_json::Value {
        let body = serde_json::json!({ "email": email, "password": password });
        let res = self
            .client
            .post(&self.url("/api/v1/auth/register"), &body.to_string())
            .await;
        assert_eq!(res.status, 201, "Register failed: {}", res.body);
        res.data()
    }

    /// Log in through the API and return the `data` object.
    pub async fn login(&self, email: &str, password: &str) -> serde_json::Value {
        let body = serde_json::json!({ "email": email, "password": password });
        let res = self
            .client
            .post(&self.url("/api/v1/auth/login"), &body.to_string())
            .await;
        assert_eq!(res.status, 200, "Login failed: {}", res.body);
        res.data()
    }

    /// Register `email`, promote it to admin, and return a fresh access
    /// token that carries the admin role.
    pub async fn admin_token(&self, email: &str, password: &str) -> String {
        self.register(email, password).await;
        self.state
            .rbac
            .promote_admin(email)
            .await
            .expect("Failed to promote admin");
        self.login(email, password).await["access_token"]
            .as_str()
            .expect("access_token missing")
            .to_string()
    }

    /// Load a user straight from storage.
    pub async fn user(&self, email: &str) -> User {
        self.state
            .users
            .find_by_email(email)
            .await
            .expect("Failed to load user")
            .expect("User not found")
    }
}

/// A simple HTTP test client with helper methods.
#[derive(Clone)]
pub struct TestClient {
    inner: reqwest::Client,
    base_addr: SocketAddr,
}

impl TestClient {
    pub fn new(addr: SocketAddr) -> Self {
        TestClient {
            inner: reqwest::Client::new(),
            base_addr: addr,
        }
    }

    pub async fn get(&self, url: &str) -> TestResponse {
        self.send(self.inner.get(url)).await
    }

    pub async fn get_with_auth(&self, url: &str, token: &str) -> TestResponse {
        self.send(self.inner.get(url).bearer_auth(token)).await
    }

    /// POST a JSON body.
    pub async fn post(&self, url: &str, body: &str) -> TestResponse {
        self.send(json_body(self.inner.post(url), body)).await
    }

    pub async fn post_with_auth(&self, url: &str, token: &str, body: &str) -> TestResponse {
        self.send(json_body(self.inner.post(url), body).bearer_auth(token))
            .await
    }

    pub async fn put_with_auth(&self, url: &str, token: &str, body: &str) -> TestResponse {
        self.send(json_body(self.inner.put(url), body).bearer_auth(token))
            .await
    }

    pub async fn delete_with_auth(&self, url: &str, token: &str) -> TestResponse {
        self.send(self.inner.delete(url).bearer_auth(token)).await
    }

    /// Send a request with arbitrary headers, e.g. a malformed Authorization.
    pub async fn get_with_headers(&self, url: &str, headers: HeaderMap) -> TestResponse {
        self.send(self.inner.get(url).headers(headers)).await
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.base_addr)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> TestResponse {
        let res = req.send().await.expect("HTTP request failed");
        TestResponse::from_response(res).await
    }
}

fn json_body(req: reqwest::RequestBuilder, body: &str) -> reqwest::RequestBuilder {
    req.header("Content-Type", "application/json")
        .body(body.to_string())
}

/// A simplified HTTP response for test assertions.
#[derive(Debug)]
pub struct TestResponse {
    pub status: u16,
    pub body: String,
    pub headers: HeaderMap,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let mut headers = HeaderMap::new();
        for (name, value) in res.headers() {
            if let (Ok(name), Ok(value)) = (
                axum::http::HeaderName::from_bytes(name.as_str().as_bytes()),
                axum::http::HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(name, value);
            }
        }
        let body = res.text().await.unwrap_or_default();
        TestResponse {
            status,
            body,
            headers,
        }
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("Failed to parse response as JSON")
    }

    pub fn is_success(&self) -> bool {
        self.json()["success"].as_bool().unwrap_or(false)
    }

    pub fn data(&self) -> serde_json::Value {
        self.json()["data"].clone()
    }

    pub fn error(&self) -> serde_json::Value {
        self.json()["error"].clone()
    }

    /// `error.code` of a failed response.
    pub fn error_code(&self) -> String {
        self.error()["code"].as_str().unwrap_or_default().to_string()
    }
}
