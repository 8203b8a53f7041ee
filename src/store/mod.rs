//! Ledger Store contract.
//!
//! The services talk to storage only through [`LedgerStore`]. Every call takes
//! an [`OpContext`] and must honor its deadline and cancellation; no call
//! retries on its own.
//!
//! Stores that can run a multi-row transaction also implement
//! [`AtomicTransfer`] and expose it through [`LedgerStore::atomic_transfers`].
//! The transfer service prefers that path and falls back to compensating
//! writes when it is absent.

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    context::OpContext,
    error::StoreError,
    models::{
        account::{Account, AccountId},
        transaction::{Transaction, TransferKey},
    },
};

/// Durable storage of accounts and the transaction log.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch an account. Absence is `Ok(None)`, not an error.
    async fn get_account(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError>;

    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// `StoreError::AlreadyExists` if the id is taken.
    async fn create_account(&self, ctx: &OpContext, account: &Account) -> Result<(), StoreError>;

    /// Overwrite the balance of an existing account.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if no such account exists.
    async fn update_balance(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
        new_balance: Decimal,
    ) -> Result<(), StoreError>;

    /// Append a record to the transaction log under `key`.
    ///
    /// Appending a key that is already recorded succeeds without adding a
    /// second record.
    async fn append_transaction(
        &self,
        ctx: &OpContext,
        key: TransferKey,
        transaction: &Transaction,
    ) -> Result<(), StoreError>;

    /// Cheap connectivity check used by the health endpoint.
    async fn ping(&self, _ctx: &OpContext) -> Result<(), StoreError> {
        Ok(())
    }

    /// Multi-row transaction support, if the backing engine has it.
    fn atomic_transfers(&self) -> Option<&dyn AtomicTransfer> {
        None
    }
}

/// Whole-transfer execution inside a single storage transaction.
#[async_trait]
pub trait AtomicTransfer: Send + Sync {
    /// Debit, credit and record `transfer` as one unit.
    ///
    /// Implementations lock both accounts in ascending id order and re-check
    /// the preconditions under lock, in this order: source exists, source
    /// balance covers the amount, destination exists.
    ///
    /// If a record with `key` already exists the transfer was committed by an
    /// earlier attempt; the call returns `Ok` and writes nothing.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` for a missing source or destination
    /// - `StoreError::InsufficientBalance` if the source cannot cover the amount
    ///
    /// On any error nothing has been written.
    async fn apply_transfer(
        &self,
        ctx: &OpContext,
        key: TransferKey,
        transfer: &Transaction,
    ) -> Result<(), StoreError>;
}
