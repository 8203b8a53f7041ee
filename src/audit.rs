//! Audit trail for ledger mutations.
//!
//! The services receive an `Arc<dyn AuditLog>` and report events to it.
//! Recording is synchronous and infallible: an audit sink must never block or
//! fail a transfer.
//!
//! [`TracingAuditLog`] emits each event under the `audit` tracing target; the
//! binary routes that target to a dedicated file (see `main.rs`).

use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::models::{account::Account, transaction::Transaction};

/// Tracing target used for audit events.
pub const AUDIT_TARGET: &str = "audit";

/// An auditable ledger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    TransactionInitiated(Transaction),
    TransactionCompleted(Transaction),
    AccountCreated(Account),
    BalanceUpdated(Account),
}

impl AuditEvent {
    pub fn action(&self) -> &'static str {
        match self {
            AuditEvent::TransactionInitiated(_) => "transaction initiated",
            AuditEvent::TransactionCompleted(_) => "transaction completed",
            AuditEvent::AccountCreated(_) => "account created",
            AuditEvent::BalanceUpdated(_) => "balance updated",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditEvent::TransactionInitiated(tx) | AuditEvent::TransactionCompleted(tx) => write!(
                f,
                "{}: source account {}, destination account {}, amount {}",
                self.action(),
                tx.source_account_id,
                tx.destination_account_id,
                tx.amount
            ),
            AuditEvent::AccountCreated(account) | AuditEvent::BalanceUpdated(account) => write!(
                f,
                "{}: account {}, balance {}",
                self.action(),
                account.account_id,
                account.balance
            ),
        }
    }
}

/// Sink for audit events.
pub trait AuditLog: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Writes audit events through `tracing` under [`AUDIT_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, event: &AuditEvent) {
        tracing::info!(target: AUDIT_TARGET, action = event.action(), "{event}");
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditLog;

impl AuditLog for NoopAuditLog {
    fn record(&self, _event: &AuditEvent) {}
}

/// Keeps events in memory so callers can inspect what was audited.
#[derive(Debug, Default)]
pub struct RecordingAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditLog for RecordingAuditLog {
    fn record(&self, event: &AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
