//! Transfer service - core business logic for moving funds between accounts.
//!
//! This service handles:
//! - Request validation (amount, self-transfer)
//! - Balance and existence checks
//! - Applying the debit, credit and transaction record as one unit
//! - Bounded retry of transient storage failures
//! - Audit events for initiated and completed transfers
//!
//! # Atomicity Guarantees
//!
//! When the store offers [`AtomicTransfer`], the whole transfer is one storage
//! transaction and nothing partial is ever visible.
//!
//! Otherwise the transfer runs a compensation protocol while holding both
//! accounts' locks (taken in ascending id order). A failed credit or record
//! restores the pre-transfer balances; if that restore itself fails the
//! caller gets [`LedgerError::CompensationFailed`] and the ledger must be
//! reconciled by hand.
//!
//! Each attempt's writes run on their own tokio task, so a caller that is
//! dropped (client disconnect, an outer timeout) cannot leave a debit without
//! its credit or its compensation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::{LedgerSettings, locks::AccountLocks};
use crate::{
    audit::{AuditEvent, AuditLog},
    context::OpContext,
    error::{LedgerError, Operation, StoreError},
    models::{
        account::{Account, AccountId},
        transaction::{Transaction, TransferKey},
    },
    store::{AtomicTransfer, LedgerStore},
};

/// Transfer state machine stages.
///
/// `Validated → SourceDebited → DestCredited → Recorded → Completed`, with
/// `Compensating → Failed` reachable from any stage after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Validated,
    SourceDebited,
    DestCredited,
    Recorded,
    Completed,
    Compensating,
    Failed,
}

impl TransferStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStage::Validated => "VALIDATED",
            TransferStage::SourceDebited => "SOURCE_DEBITED",
            TransferStage::DestCredited => "DEST_CREDITED",
            TransferStage::Recorded => "RECORDED",
            TransferStage::Completed => "COMPLETED",
            TransferStage::Compensating => "COMPENSATING",
            TransferStage::Failed => "FAILED",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStage::Completed | TransferStage::Failed)
    }
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct TransferService {
    writer: TransferWriter,
    audit: Arc<dyn AuditLog>,
    settings: LedgerSettings,
}

impl TransferService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        locks: Arc<AccountLocks>,
        audit: Arc<dyn AuditLog>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            writer: TransferWriter {
                store,
                locks,
                restore_timeout: settings.store_timeout,
            },
            audit,
            settings,
        }
    }

    /// Move `amount` from `source_id` to `destination_id`.
    ///
    /// # Process
    ///
    /// 1. Audit "transaction initiated"
    /// 2. Validate: amount positive, accounts distinct
    /// 3. Check source exists, source balance covers amount, destination exists
    /// 4. Debit source, credit destination, record transaction
    /// 5. Audit "transaction completed"
    ///
    /// Steps 2-4 are one attempt; deadline and deadlock failures replay the
    /// attempt from step 2 under the retry policy. Every attempt carries the
    /// same [`TransferKey`], so an attempt whose commit was lost in flight is
    /// recognised instead of applied again.
    ///
    /// Steps 3-4 run on a spawned task. Dropping the returned future stops
    /// further attempts but never interrupts writes already under way: the
    /// task finishes the attempt or rolls it back.
    ///
    /// # Returns
    ///
    /// The recorded transaction
    ///
    /// # Errors
    ///
    /// - `InvalidAmount`: amount is zero or negative
    /// - `SameAccount`: source and destination are the same account
    /// - `AccountNotFound`: source or destination missing
    /// - `InsufficientBalance`: source balance below amount; nothing changes
    /// - `RetriesExhausted`: transient failures outlasted the retry budget
    /// - `CompensationFailed`: a partial transfer could not be rolled back
    /// - `Cancelled` / `Store`: caller cancelled, or storage failed
    pub async fn perform_transfer(
        &self,
        ctx: &OpContext,
        source_id: AccountId,
        destination_id: AccountId,
        amount: Decimal,
    ) -> Result<Transaction, LedgerError> {
        let transfer = Transaction::new(source_id, destination_id, amount);
        let key = TransferKey::new();
        self.audit
            .record(&AuditEvent::TransactionInitiated(transfer.clone()));

        let transfer_ref = &transfer;
        self.settings
            .retry
            .run(
                Operation::Transfer(transfer.clone()),
                ctx.cancel_signal(),
                move |attempt| self.attempt(ctx, key, transfer_ref, attempt),
            )
            .await?;

        info!(
            source = source_id,
            destination = destination_id,
            amount = %amount,
            transfer_key = %key,
            stage = %TransferStage::Completed,
            "Transfer completed"
        );
        self.audit
            .record(&AuditEvent::TransactionCompleted(transfer.clone()));

        Ok(transfer)
    }

    async fn attempt(
        &self,
        ctx: &OpContext,
        key: TransferKey,
        transfer: &Transaction,
        attempt: u32,
    ) -> Result<(), LedgerError> {
        validate(transfer)?;

        let ctx = ctx.child(self.settings.store_timeout);
        let writer = self.writer.clone();
        let owned = transfer.clone();

        // Detached: once the first write is issued the attempt runs to an end state
        let task = tokio::spawn(async move { writer.apply(&ctx, key, &owned, attempt).await });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(%transfer, %key, error = %e, "Transfer task ended abnormally");
                Err(LedgerError::store(
                    Operation::Transfer(transfer.clone()),
                    StoreError::Unavailable(format!("transfer task ended abnormally: {e}")),
                ))
            }
        }
    }
}

/// Store-facing half of a transfer attempt, cloned into the attempt's task.
#[derive(Clone)]
struct TransferWriter {
    store: Arc<dyn LedgerStore>,
    locks: Arc<AccountLocks>,
    restore_timeout: Duration,
}

impl TransferWriter {
    async fn apply(
        &self,
        ctx: &OpContext,
        key: TransferKey,
        transfer: &Transaction,
        attempt: u32,
    ) -> Result<(), LedgerError> {
        match self.store.atomic_transfers() {
            Some(atomic) => {
                debug!(%transfer, %key, attempt, "Applying transfer in one store transaction");
                apply_atomically(atomic, ctx, key, transfer).await
            }
            None => {
                debug!(%transfer, %key, attempt, "Applying transfer with compensation");
                self.apply_with_compensation(ctx, key, transfer).await
            }
        }
    }

    /// Run the transfer as individual writes, undoing them on failure.
    ///
    /// Both accounts stay locked from the first read to the last write, so
    /// the balances read at validation are the ones the restore writes back.
    async fn apply_with_compensation(
        &self,
        ctx: &OpContext,
        key: TransferKey,
        transfer: &Transaction,
    ) -> Result<(), LedgerError> {
        let source_id = transfer.source_account_id;
        let destination_id = transfer.destination_account_id;
        let amount = transfer.amount;

        let _guard = ctx
            .run(async { Ok(self.locks.lock(&[source_id, destination_id]).await) })
            .await
            .map_err(|e| LedgerError::store(Operation::Transfer(transfer.clone()), e))?;

        let source = self
            .fetch(ctx, source_id)
            .await?
            .ok_or(LedgerError::AccountNotFound {
                account_id: source_id,
            })?;

        if source.balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account_id: source_id,
                balance: source.balance,
                requested: amount,
            });
        }

        let destination = self
            .fetch(ctx, destination_id)
            .await?
            .ok_or(LedgerError::AccountNotFound {
                account_id: destination_id,
            })?;

        let mut stage = TransferStage::Validated;

        // A write that errors may still have landed (timeout after commit), so
        // each account is restored as soon as its write has been attempted.
        let mut touched = vec![source.clone()];
        if let Err(e) = self
            .store
            .update_balance(ctx, source_id, source.balance - amount)
            .await
        {
            let cause = LedgerError::store(
                Operation::Debit {
                    account_id: source_id,
                    amount,
                },
                e,
            );
            return Err(self.compensate(transfer, stage, cause, &touched).await);
        }
        stage = TransferStage::SourceDebited;

        touched.push(destination.clone());
        if let Err(e) = self
            .store
            .update_balance(ctx, destination_id, destination.balance + amount)
            .await
        {
            let cause = LedgerError::store(
                Operation::Credit {
                    account_id: destination_id,
                    amount,
                },
                e,
            );
            return Err(self.compensate(transfer, stage, cause, &touched).await);
        }
        stage = TransferStage::DestCredited;

        // A record that lands despite the error stays; a retry's append under the
        // same key is a no-op
        if let Err(e) = self.store.append_transaction(ctx, key, transfer).await {
            let cause = LedgerError::store(Operation::RecordTransaction(transfer.clone()), e);
            return Err(self.compensate(transfer, stage, cause, &touched).await);
        }
        stage = TransferStage::Recorded;

        debug!(%transfer, %stage, "Transfer writes applied");
        Ok(())
    }

    async fn fetch(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
    ) -> Result<Option<Account>, LedgerError> {
        self.store
            .get_account(ctx, account_id)
            .await
            .map_err(|e| LedgerError::store(Operation::GetAccount { account_id }, e))
    }

    /// Write back the pre-transfer balances of `touched`.
    ///
    /// Runs on a fresh deadline with no cancellation: a cancelled or expired
    /// request must still undo what it wrote. Every account is attempted even
    /// if an earlier restore fails.
    ///
    /// Returns `cause` when everything was restored, `CompensationFailed` otherwise.
    async fn compensate(
        &self,
        transfer: &Transaction,
        failed_at: TransferStage,
        cause: LedgerError,
        touched: &[Account],
    ) -> LedgerError {
        warn!(
            %transfer,
            stage = %TransferStage::Compensating,
            failed_after = %failed_at,
            error = %cause,
            "Transfer step failed, restoring balances"
        );

        let ctx = OpContext::background().with_timeout(self.restore_timeout);
        let mut first_failure = None;
        for account in touched {
            let result = self
                .store
                .update_balance(&ctx, account.account_id, account.balance)
                .await;

            if let Err(e) = result {
                let failure = LedgerError::store(
                    Operation::Restore {
                        account_id: account.account_id,
                        balance: account.balance,
                    },
                    e,
                );
                error!(
                    %transfer,
                    account_id = account.account_id,
                    error = %failure,
                    "Compensation write failed"
                );
                first_failure.get_or_insert(failure);
            }
        }

        match first_failure {
            None => {
                info!(%transfer, stage = %TransferStage::Failed, "Transfer rolled back");
                cause
            }
            Some(compensation) => {
                error!(
                    %transfer,
                    stage = %TransferStage::Failed,
                    "Ledger inconsistent, manual reconciliation required"
                );
                LedgerError::CompensationFailed {
                    transfer: transfer.clone(),
                    cause: Box::new(cause),
                    compensation: Box::new(compensation),
                }
            }
        }
    }
}

/// Checks that need no storage access.
fn validate(transfer: &Transaction) -> Result<(), LedgerError> {
    if transfer.amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount {
            amount: transfer.amount,
            reason: "transfer amount must be greater than zero",
        });
    }

    if transfer.source_account_id == transfer.destination_account_id {
        return Err(LedgerError::SameAccount {
            account_id: transfer.source_account_id,
        });
    }

    Ok(())
}

/// Hand the whole transfer to the store's transaction support.
async fn apply_atomically(
    atomic: &dyn AtomicTransfer,
    ctx: &OpContext,
    key: TransferKey,
    transfer: &Transaction,
) -> Result<(), LedgerError> {
    atomic
        .apply_transfer(ctx, key, transfer)
        .await
        .map_err(|e| match e {
            StoreError::NotFound(account_id) => LedgerError::AccountNotFound { account_id },
            StoreError::InsufficientBalance {
                account_id,
                balance,
            } => LedgerError::InsufficientBalance {
                account_id,
                balance,
                requested: transfer.amount,
            },
            other => LedgerError::store(Operation::Transfer(transfer.clone()), other),
        })
}
