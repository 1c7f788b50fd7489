//! Postgres connection pool construction.

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;

/// Open the process-wide connection pool.
///
/// The pool is created once at startup and closed once at shutdown; failure
/// here is fatal.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.name)
        .ssl_mode(config.ssl_mode);

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
}
