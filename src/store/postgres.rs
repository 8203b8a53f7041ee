//! PostgreSQL Ledger Store.
//!
//! Implements the store contract with sqlx against the `accounts` and
//! `transactions` tables (see `migrations/`).
//!
//! # Atomicity Guarantees
//!
//! Single-row operations are single statements. Transfers go through
//! [`AtomicTransfer::apply_transfer`], which runs inside one PostgreSQL
//! transaction: both account rows are locked with `FOR UPDATE` in ascending
//! id order, so concurrent `A -> B` and `B -> A` transfers queue behind each
//! other instead of deadlocking, and no reader ever sees a half-applied
//! transfer.
//!
//! Every record carries the transfer's [`TransferKey`] in a UNIQUE column.
//! A COMMIT can succeed on the server after the client has given up waiting
//! for it; the retried attempt then finds its key and stops.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use super::{AtomicTransfer, LedgerStore};
use crate::{
    context::OpContext,
    db::DbPool,
    error::StoreError,
    models::{
        account::{Account, AccountId},
        transaction::{Transaction, TransferKey},
    },
};

#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: DbPool,
}

impl PgLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get_account(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        ctx.run(async {
            let account = sqlx::query_as::<_, Account>(
                "SELECT account_id, balance FROM accounts WHERE account_id = $1",
            )
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(account)
        })
        .await
    }

    async fn create_account(&self, ctx: &OpContext, account: &Account) -> Result<(), StoreError> {
        ctx.run(async {
            // ON CONFLICT turns a racing duplicate into "no row inserted" instead of an error
            let inserted = sqlx::query(
                r#"
                INSERT INTO accounts (account_id, balance)
                VALUES ($1, $2)
                ON CONFLICT (account_id) DO NOTHING
                "#,
            )
            .bind(account.account_id)
            .bind(account.balance)
            .execute(&self.pool)
            .await?
            .rows_affected();

            if inserted == 0 {
                return Err(StoreError::AlreadyExists(account.account_id));
            }

            Ok(())
        })
        .await
    }

    async fn update_balance(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
        new_balance: Decimal,
    ) -> Result<(), StoreError> {
        ctx.run(async {
            let updated = sqlx::query("UPDATE accounts SET balance = $1 WHERE account_id = $2")
                .bind(new_balance)
                .bind(account_id)
                .execute(&self.pool)
                .await?
                .rows_affected();

            if updated == 0 {
                return Err(StoreError::NotFound(account_id));
            }

            Ok(())
        })
        .await
    }

    async fn append_transaction(
        &self,
        ctx: &OpContext,
        key: TransferKey,
        transaction: &Transaction,
    ) -> Result<(), StoreError> {
        ctx.run(async {
            sqlx::query(
                r#"
                INSERT INTO transactions (transfer_key, source_account_id, destination_account_id, amount)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (transfer_key) DO NOTHING
                "#,
            )
            .bind(key.as_uuid())
            .bind(transaction.source_account_id)
            .bind(transaction.destination_account_id)
            .bind(transaction.amount)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }

    async fn ping(&self, ctx: &OpContext) -> Result<(), StoreError> {
        ctx.run(async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    fn atomic_transfers(&self) -> Option<&dyn AtomicTransfer> {
        Some(self)
    }
}

#[async_trait]
impl AtomicTransfer for PgLedgerStore {
    /// Execute a transfer inside one database transaction.
    ///
    /// # Process
    ///
    /// 1. Start database transaction
    /// 2. Lock both accounts in ascending id order
    /// 3. Stop if `key` is already recorded
    /// 4. Check source exists, source balance, destination exists
    /// 5. Debit source, credit destination
    /// 6. Record transaction with its key
    /// 7. Commit (dropping the transaction on any early return rolls it back)
    async fn apply_transfer(
        &self,
        ctx: &OpContext,
        key: TransferKey,
        transfer: &Transaction,
    ) -> Result<(), StoreError> {
        ctx.run(async {
            let source_id = transfer.source_account_id;
            let destination_id = transfer.destination_account_id;
            let ids = [source_id, destination_id];

            let mut tx = self.pool.begin().await?;

            // Lock rows in a fixed global order; ORDER BY applies before FOR UPDATE takes the locks
            let locked = sqlx::query_as::<_, Account>(
                r#"
                SELECT account_id, balance
                FROM accounts
                WHERE account_id = ANY($1)
                ORDER BY account_id
                FOR UPDATE
                "#,
            )
            .bind(&ids[..])
            .fetch_all(&mut *tx)
            .await?;

            // Checked under the row locks: an earlier attempt's COMMIT is visible by now
            let recorded = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM transactions WHERE transfer_key = $1)",
            )
            .bind(key.as_uuid())
            .fetch_one(&mut *tx)
            .await?;

            if recorded {
                tx.rollback().await?;
                debug!(%key, %transfer, "Transfer already committed by an earlier attempt");
                return Ok(());
            }

            let Some(source) = locked.iter().find(|a| a.account_id == source_id) else {
                tx.rollback().await?;
                return Err(StoreError::NotFound(source_id));
            };

            if source.balance < transfer.amount {
                let balance = source.balance;
                tx.rollback().await?;
                return Err(StoreError::InsufficientBalance {
                    account_id: source_id,
                    balance,
                });
            }

            if !locked.iter().any(|a| a.account_id == destination_id) {
                tx.rollback().await?;
                return Err(StoreError::NotFound(destination_id));
            }

            sqlx::query("UPDATE accounts SET balance = balance - $1 WHERE account_id = $2")
                .bind(transfer.amount)
                .bind(source_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query("UPDATE accounts SET balance = balance + $1 WHERE account_id = $2")
                .bind(transfer.amount)
                .bind(destination_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO transactions (transfer_key, source_account_id, destination_account_id, amount)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(key.as_uuid())
            .bind(source_id)
            .bind(destination_id)
            .bind(transfer.amount)
            .execute(&mut *tx)
            .await?;

            // Commit all three writes atomically
            tx.commit().await?;

            Ok(())
        })
        .await
    }
}
