//! Account service - create, read and administratively correct accounts.
//!
//! Every operation runs under the shared [`RetryPolicy`](super::RetryPolicy):
//! each attempt gets a fresh store deadline, and deadline or deadlock failures
//! are replayed from the start. Mutations hold the account's entry in the
//! shared [`AccountLocks`] table so they never interleave with an in-process
//! transfer touching the same account.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use super::{
    LedgerSettings,
    locks::{AccountGuard, AccountLocks},
};
use crate::{
    audit::{AuditEvent, AuditLog},
    context::OpContext,
    error::{LedgerError, Operation, StoreError},
    models::account::{Account, AccountId},
    store::LedgerStore,
};

pub struct AccountService {
    store: Arc<dyn LedgerStore>,
    locks: Arc<AccountLocks>,
    audit: Arc<dyn AuditLog>,
    settings: LedgerSettings,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        locks: Arc<AccountLocks>,
        audit: Arc<dyn AuditLog>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            store,
            locks,
            audit,
            settings,
        }
    }

    /// Create a new account with the given opening balance.
    ///
    /// # Process
    ///
    /// 1. Reject a negative opening balance
    /// 2. Lock the account id
    /// 3. Check whether the id is already taken
    /// 4. Insert the account
    ///
    /// # Errors
    ///
    /// - `InvalidAmount`: `initial_balance` is negative
    /// - `AlreadyExists`: the id is taken; the existing balance is untouched
    /// - `Store` / `RetriesExhausted` / `Cancelled`: storage failed
    pub async fn create_account(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
        initial_balance: Decimal,
    ) -> Result<Account, LedgerError> {
        if initial_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount {
                amount: initial_balance,
                reason: "initial balance must not be negative",
            });
        }

        let account = Account::new(account_id, initial_balance);
        let operation = Operation::CreateAccount { account_id };
        let (account_ref, operation_ref) = (&account, &operation);

        self.settings
            .retry
            .run(operation.clone(), ctx.cancel_signal(), move |_| {
                self.create_once(ctx, account_ref, operation_ref)
            })
            .await?;

        info!(account_id, balance = %initial_balance, "Account created");
        self.audit.record(&AuditEvent::AccountCreated(account.clone()));

        Ok(account)
    }

    async fn create_once(
        &self,
        ctx: &OpContext,
        account: &Account,
        operation: &Operation,
    ) -> Result<(), LedgerError> {
        let ctx = ctx.child(self.settings.store_timeout);
        let account_id = account.account_id;
        let _guard = self.lock(&ctx, account_id, operation).await?;

        let existing = self
            .store
            .get_account(&ctx, account_id)
            .await
            .map_err(|e| LedgerError::store(Operation::GetAccount { account_id }, e))?;

        if existing.is_some() {
            return Err(LedgerError::AlreadyExists { account_id });
        }

        // The store re-checks: another process may have inserted in between
        self.store
            .create_account(&ctx, account)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists(account_id) => LedgerError::AlreadyExists { account_id },
                other => LedgerError::store(operation.clone(), other),
            })
    }

    /// Look up an account.
    ///
    /// A missing account is `Ok(None)`; only storage failures are errors.
    pub async fn get_account(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
    ) -> Result<Option<Account>, LedgerError> {
        let operation = Operation::GetAccount { account_id };
        let operation_ref = &operation;

        let account = self
            .settings
            .retry
            .run(operation.clone(), ctx.cancel_signal(), move |_| async move {
                let ctx = ctx.child(self.settings.store_timeout);
                self.store
                    .get_account(&ctx, account_id)
                    .await
                    .map_err(|e| LedgerError::store(operation_ref.clone(), e))
            })
            .await?;

        debug!(account_id, found = account.is_some(), "Account lookup");
        Ok(account)
    }

    /// Overwrite the balance of an existing account.
    ///
    /// This is an administrative correction: it ignores transfer semantics and
    /// writes no transaction record. Do not use it to move funds.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount`: `new_balance` is negative
    /// - `AccountNotFound`: no account with this id
    /// - `Store` / `RetriesExhausted` / `Cancelled`: storage failed
    pub async fn update_balance(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
        new_balance: Decimal,
    ) -> Result<Account, LedgerError> {
        if new_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount {
                amount: new_balance,
                reason: "balance must not be negative",
            });
        }

        let operation = Operation::UpdateBalance { account_id };
        let operation_ref = &operation;

        self.settings
            .retry
            .run(operation.clone(), ctx.cancel_signal(), move |_| {
                self.update_once(ctx, account_id, new_balance, operation_ref)
            })
            .await?;

        let account = Account::new(account_id, new_balance);
        info!(account_id, balance = %new_balance, "Account balance overwritten");
        self.audit.record(&AuditEvent::BalanceUpdated(account.clone()));

        Ok(account)
    }

    async fn update_once(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
        new_balance: Decimal,
        operation: &Operation,
    ) -> Result<(), LedgerError> {
        let ctx = ctx.child(self.settings.store_timeout);
        let _guard = self.lock(&ctx, account_id, operation).await?;

        let existing = self
            .store
            .get_account(&ctx, account_id)
            .await
            .map_err(|e| LedgerError::store(Operation::GetAccount { account_id }, e))?;

        if existing.is_none() {
            return Err(LedgerError::AccountNotFound { account_id });
        }

        self.store
            .update_balance(&ctx, account_id, new_balance)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(account_id) => LedgerError::AccountNotFound { account_id },
                other => LedgerError::store(operation.clone(), other),
            })
    }

    async fn lock(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
        operation: &Operation,
    ) -> Result<AccountGuard, LedgerError> {
        ctx.run(async { Ok(self.locks.lock(&[account_id]).await) })
            .await
            .map_err(|e| LedgerError::store(operation.clone(), e))
    }
}
