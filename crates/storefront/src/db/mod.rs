//! `PostgreSQL` access for the session store.
//!
//! The shop API owns all catalog, cart and order data. The storefront's own
//! database only holds `tower_sessions.session` rows, created by
//! `PostgresStore::migrate` at startup.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tower_sessions_sqlx_store::PostgresStore;

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Connect to `PostgreSQL` and prepare the session table.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection or the migration fails.
pub async fn create_session_store(database_url: &SecretString) -> Result<PostgresStore, sqlx::Error> {
    let pool = create_pool(database_url).await?;
    let store = PostgresStore::new(pool);
    store.migrate().await?;
    Ok(store)
}
