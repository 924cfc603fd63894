//! Token lifecycle and role-based authorization engine.
//!
//! Access tokens are short-lived HMAC-signed JWTs; refresh tokens are opaque
//! random strings stored only as SHA-256 digests and rotated on every use.
//! Roles carry permission sets, and only an `admin` may change them.

pub mod app;
pub mod auth;
pub mod config;
pub mod controllers;
pub mod db;
pub mod domain;
pub mod error;
pub mod extractors;
pub mod logging;
pub mod migrations;
pub mod models;
pub mod openapi;
pub mod response;
pub mod store;
pub mod testing;
pub mod usecases;

pub use app::App;
pub use config::Config;
pub use error::AuthError;
pub use response::ApiResponse;
pub use testing::{TestApp, TestClient, TestResponse};
