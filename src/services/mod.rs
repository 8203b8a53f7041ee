//! Business logic services.
//!
//! Services contain the ledger's core logic, separated from HTTP handlers:
//! validation, retry, locking, compensation and audit.

use std::time::Duration;

pub mod account_service;
pub mod locks;
pub mod retry;
pub mod transfer_service;

pub use account_service::AccountService;
pub use locks::AccountLocks;
pub use retry::RetryPolicy;
pub use transfer_service::{TransferService, TransferStage};

/// Default per-attempt store deadline.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry and timeout discipline shared by the account and transfer services.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub retry: RetryPolicy,

    /// Deadline for each attempt's store calls; the caller's own deadline still applies if earlier.
    pub store_timeout: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}
