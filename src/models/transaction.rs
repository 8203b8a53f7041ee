//! Transaction data models and the transfer request type.
//!
//! This module defines:
//! - `Transaction`: Immutable record of a completed transfer
//! - `TransferKey`: Idempotency key shared by every attempt of one transfer
//! - `TransferRequest`: Request body for moving funds between accounts

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountId;

/// Represents a transaction record in the append-only log.
///
/// # Database Table
///
/// Maps to the `transactions` table. Each transaction:
/// - References a source and a destination account
/// - Stores the moved amount as an exact decimal
/// - Is never updated or deleted once appended
///
/// A successful transfer always produces exactly one record.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Transaction {
    /// Account the funds leave
    pub source_account_id: AccountId,

    /// Account the funds arrive at
    pub destination_account_id: AccountId,

    /// Amount moved, always positive
    pub amount: Decimal,
}

impl Transaction {
    pub fn new(
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: Decimal,
    ) -> Self {
        Self {
            source_account_id,
            destination_account_id,
            amount,
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({})",
            self.source_account_id, self.destination_account_id, self.amount
        )
    }
}

/// Idempotency key for one transfer request.
///
/// Generated once per `perform_transfer` call and stored with the
/// transaction record (`transactions.transfer_key`, UNIQUE). A retried attempt
/// that finds its key already recorded treats the transfer as done, so a
/// commit whose acknowledgement was lost is never applied twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferKey(Uuid);

impl TransferKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransferKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Request to transfer money between accounts.
///
/// # JSON Example
///
/// ```json
/// {
///   "source_account_id": 1,
///   "destination_account_id": 2,
///   "amount": "30.00"
/// }
/// ```
///
/// # Atomicity Guarantee
///
/// Either both balances change and the record is appended, or nothing
/// observable changes.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    pub amount: Decimal,
}

impl From<TransferRequest> for Transaction {
    fn from(request: TransferRequest) -> Self {
        Self::new(
            request.source_account_id,
            request.destination_account_id,
            request.amount,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn display_names_both_accounts_and_amount() {
        let tx = Transaction::new(1, 2, dec!(30.00));
        assert_eq!(tx.to_string(), "1 -> 2 (30.00)");
    }

    #[test]
    fn transfer_request_converts_into_record() {
        let request: TransferRequest = serde_json::from_str(
            r#"{"source_account_id": 1, "destination_account_id": 2, "amount": "30.00"}"#,
        )
        .unwrap();

        assert_eq!(Transaction::from(request), Transaction::new(1, 2, dec!(30)));
    }

    #[test]
    fn transfer_keys_are_unique_per_call() {
        let first = TransferKey::new();
        let second = TransferKey::new();

        assert_ne!(first, second);
        assert_eq!(first.to_string(), first.as_uuid().to_string());
    }
}
