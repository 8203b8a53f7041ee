//! Internal Transfers Service - Main Application Entry Point
//!
//! REST API server for creating accounts and moving funds between them.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx, or an in-memory ledger when no
//!   `DATABASE_URL` is configured
//! - **Format**: JSON requests/responses, decimals as strings
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Initialize logging (stdout plus the audit file)
//! 3. Open the ledger store (create pool, run migrations)
//! 4. Build services and the HTTP router
//! 5. Serve until SIGINT/SIGTERM, then shut down gracefully

use std::path::Path;
use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use internal_transfers::{
    audit::{AUDIT_TARGET, AuditLog, TracingAuditLog},
    config::Config,
    db,
    handlers::{self, AppState},
    services::{AccountLocks, AccountService, TransferService},
    store::{LedgerStore, MemoryLedgerStore, PgLedgerStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Keep the guard alive so buffered audit lines are flushed on exit
    let _audit_guard = init_logging(&config.audit_log_dir);
    tracing::info!("Configuration loaded");

    let store: Arc<dyn LedgerStore> = match &config.database_url {
        Some(database_url) => {
            // Create database pool
            let pool = db::create_pool(
                database_url,
                config.db_max_connections,
                config.store_timeout(),
            )
            .await?;
            tracing::info!("Database pool created");

            // Run migrations
            db::run_migrations(&pool).await?;
            tracing::info!("Database migrations complete");

            Arc::new(PgLedgerStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory ledger (data is lost on exit)");
            Arc::new(MemoryLedgerStore::new())
        }
    };

    // Both services share one lock table so admin writes and transfers serialize per account
    let locks = Arc::new(AccountLocks::new());
    let audit: Arc<dyn AuditLog> = Arc::new(TracingAuditLog);
    let settings = config.ledger_settings();

    let state = AppState {
        accounts: Arc::new(AccountService::new(
            store.clone(),
            locks.clone(),
            audit.clone(),
            settings.clone(),
        )),
        transfers: Arc::new(TransferService::new(store.clone(), locks, audit, settings)),
        store,
    };

    let app = handlers::router(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Initialize logging.
///
/// - stdout: everything allowed by `RUST_LOG` (defaults to "info")
/// - `<audit_dir>/audit.log`: only events under the audit target
fn init_logging(audit_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::never(audit_dir, "audit.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = fmt::layer().with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );

    let audit_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_filter(Targets::new().with_target(AUDIT_TARGET, tracing::Level::INFO));

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(audit_layer)
        .init();

    guard
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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

    tracing::info!("Shutdown signal received");
}
