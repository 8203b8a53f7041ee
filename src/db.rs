//! PostgreSQL bootstrap for the ledger store.
//!
//! Opens the sqlx pool the [`PgLedgerStore`](crate::store::PgLedgerStore)
//! runs on and applies the schema in `migrations/` before the server starts.

use std::time::Duration;

use sqlx::{Pool, Postgres};

/// Connection pool shared by every store call.
pub type DbPool = Pool<Postgres>;

/// Open a pool against `database_url`.
///
/// # Arguments
///
/// * `database_url` - `postgres://` connection string
/// * `max_connections` - Upper bound on pooled connections
/// * `acquire_timeout` - How long a store call may wait for a free connection
///
/// A store call that waits longer than `acquire_timeout` for a connection
/// fails with `PoolTimedOut`, which surfaces as an exceeded deadline and is
/// retried like any other.
///
/// # Errors
///
/// Fails if the URL does not parse or the first connection cannot be
/// established (server down, bad credentials).
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}

/// Bring the `accounts` and `transactions` tables up to date.
///
/// Applied versions are tracked in `_sqlx_migrations`; re-running is a no-op.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    // Embedded at compile time
    sqlx::migrate!("./migrations").run(pool).await
}
