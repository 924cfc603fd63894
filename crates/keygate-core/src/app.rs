use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::auth::{GoogleLoginDisabled, GoogleTokenInfoVerifier, IdTokenVerifier};
use crate::config::Config;
use crate::controllers::{self, AppState};
use crate::error::AuthError;
use crate::migrations::Migrator;
use crate::openapi::ApiDoc;

const API_DOCS_PATH: &str = "/api-docs";
const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

/// The keygate application: configuration, database and wired services.
pub struct App {
    pub config: Config,
    pub db: DatabaseConnection,
    state: AppState,
}

impl App {
    /// Load configuration from the environment and connect.
    pub async fn new() -> Result<Self, AuthError> {
        Self::with_config(Config::from_env()?).await
    }

    /// Connect with the given config. Google login uses the tokeninfo
    /// endpoint when `google_client_id` is set and is disabled otherwise.
    pub async fn with_config(config: Config) -> Result<Self, AuthError> {
        let google: Arc<dyn IdTokenVerifier> = match &config.google_client_id {
            Some(client_id) => Arc::new(GoogleTokenInfoVerifier::new(client_id.clone())?),
            None => Arc::new(GoogleLoginDisabled),
        };
        Self::with_verifier(config, google).await
    }

    /// Connect with an explicit ID-token verifier.
    pub async fn with_verifier(
        config: Config,
        google: Arc<dyn IdTokenVerifier>,
    ) -> Result<Self, AuthError> {
        let db = crate::db::connect(&config)
            .await
            .map_err(|e| AuthError::storage("connect to the database", e))?;
        let state = AppState::new(config.clone(), db.clone(), google)?;
        Ok(App { config, db, state })
    }

    /// Apply pending migrations.
    pub async fn run_migrations(&self) -> Result<(), AuthError> {
        tracing::info!("Running pending database migrations...");
        Migrator::up(&self.db, None)
            .await
            .map_err(|e| AuthError::storage("run migrations", e))?;
        tracing::info!("Migrations complete.");
        Ok(())
    }

    /// Startup bootstrap driven by configuration: seed the default roles and
    /// promote the configured account to admin.
    pub async fn bootstrap(&self) -> Result<(), AuthError> {
        if self.config.seed_default_roles {
            let created = self.state.rbac.seed_default_roles().await?;
            tracing::info!(created = created.len(), "default roles seeded");
        }
        if let Some(email) = &self.config.bootstrap_admin_email {
            match self.state.rbac.promote_admin(email).await {
                Ok(user) => tracing::info!(user_id = %user.id, "bootstrap admin ready"),
                Err(AuthError::NotFound(_)) => {
                    tracing::warn!("BOOTSTRAP_ADMIN_EMAIL does not match a registered user")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with tracing, request ids, CORS and the API docs.
    pub fn router(&self) -> Router {
        let openapi = ApiDoc::openapi();
        let openapi_json = openapi.clone();
        let x_request_id = axum::http::HeaderName::from_static("x-request-id");

        controllers::routes(&self.state)
            .with_state(self.state.clone())
            .merge(Scalar::with_url(API_DOCS_PATH, openapi))
            .route(
                OPENAPI_JSON_PATH,
                get(move || {
                    let spec = openapi_json.clone();
                    async move { axum::Json(spec) }
                }),
            )
            .layer(CorsLayer::permissive())
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(
                        DefaultMakeSpan::new()
                            .level(tracing::Level::INFO)
                            .include_headers(false),
                    )
                    .on_request(DefaultOnRequest::new().level(tracing::Level::DEBUG))
                    .on_response(
                        DefaultOnResponse::new()
                            .level(tracing::Level::INFO)
                            .latency_unit(LatencyUnit::Millis),
                    ),
            )
            .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn run(self) -> Result<(), AuthError> {
        let addr = self.config.server_addr();
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| AuthError::Internal(format!("failed to bind {addr}: {e}")))?;
        tracing::info!(%addr, docs = API_DOCS_PATH, "keygate listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| AuthError::Internal(format!("server error: {e}")))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutting down keygate...");
}
