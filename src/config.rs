//! Runtime settings, read from the process environment (and `.env`).
//!
//! Every field has a default, so an empty environment yields a working
//! in-memory server on port 3000.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::services::{LedgerSettings, retry::RetryPolicy};

/// Server, store and retry settings.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (optional): PostgreSQL connection string. Without it the
///   ledger lives in memory and is lost on exit.
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `STORE_TIMEOUT_SECS` (optional): per-attempt store deadline, defaults to 30
/// - `RETRY_MAX_ATTEMPTS` (optional): attempts per operation, defaults to 2
/// - `RETRY_DELAY_MS` (optional): pause between attempts, defaults to 2000
/// - `DB_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `AUDIT_LOG_DIR` (optional): directory for `audit.log`, defaults to `.`
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,

    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_audit_log_dir")]
    pub audit_log_dir: PathBuf,
}

fn default_port() -> u16 {
    3000
}

fn default_store_timeout_secs() -> u64 {
    30
}

fn default_retry_max_attempts() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_db_max_connections() -> u32 {
    5
}

fn default_audit_log_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    /// Read settings, letting a `.env` file in the working directory fill gaps.
    ///
    /// # Errors
    ///
    /// A variable that is set but does not parse (e.g. `SERVER_PORT=abc`).
    pub fn from_env() -> Result<Self, envy::Error> {
        // A missing .env is fine
        dotenvy::dotenv().ok();

        // Field names are converted automatically: store_timeout_secs -> STORE_TIMEOUT_SECS
        envy::from_env::<Config>()
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// Retry and timeout discipline shared by both services.
    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            retry: RetryPolicy::new(
                self.retry_max_attempts,
                Duration::from_millis(self.retry_delay_ms),
            ),
            store_timeout: self.store_timeout(),
        }
    }
}
