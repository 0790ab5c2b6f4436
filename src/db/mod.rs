//! Connection pool setup and migration runner.
//!
//! SYSTEM CONTEXT
//! ==============
//! Conversations live in memory; Postgres is the durable copy of chat
//! transcripts and draft version history. Startup builds the shared pool here
//! and applies migrations before the websocket route accepts connections, so
//! the fire-and-forget persistence writers never race an unmigrated schema.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect the Postgres pool and bring the schema up to date.
///
/// # Errors
///
/// Returns an error if the connection cannot be established or a migration
/// fails to apply.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let max_connections = std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(DB_ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;

    Ok(pool)
}
