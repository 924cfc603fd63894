use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection};
use std::time::Duration;

use crate::config::Config;

/// Initialize the database connection pool from config.
///
/// In-memory SQLite is pinned to a single connection: every pooled
/// connection would otherwise see its own empty database.
pub async fn connect(config: &Config) -> Result<DatabaseConnection, sea_orm::DbErr> {
    let mut opts = ConnectOptions::new(&config.database_url);
    if config.database_url.starts_with("sqlite::memory:") {
        opts.max_connections(1).min_connections(1);
    } else {
        opts.max_connections(50).min_connections(2);
    }
    opts.connect_timeout(Duration::from_secs(8))
        .acquire_timeout(config.store_timeout)
        .sqlx_logging(config.is_dev());

    SeaDatabase::connect(opts).await
}
