//! In-process Ledger Store.
//!
//! Keeps accounts and the transaction log behind a mutex. It offers no
//! multi-row transactions, so transfers against it run the compensation
//! protocol. Used when no database is configured, and by the tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::LedgerStore;
use crate::{
    context::OpContext,
    error::StoreError,
    models::{
        account::{Account, AccountId},
        transaction::{Transaction, TransferKey},
    },
};

#[derive(Debug, Default)]
struct Ledger {
    accounts: BTreeMap<AccountId, Decimal>,
    transactions: Vec<Transaction>,
    recorded: HashSet<TransferKey>,
}

#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    ledger: Mutex<Ledger>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `accounts`.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        {
            let mut ledger = store.ledger();
            for account in accounts {
                ledger.accounts.insert(account.account_id, account.balance);
            }
        }
        store
    }

    /// Current balance, read outside any context.
    pub fn balance(&self, account_id: AccountId) -> Option<Decimal> {
        self.ledger().accounts.get(&account_id).copied()
    }

    /// Snapshot of the transaction log in append order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.ledger().transactions.clone()
    }

    /// Sum of all balances.
    pub fn total_balance(&self) -> Decimal {
        self.ledger().accounts.values().copied().sum()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // Every write is a single assignment, so a poisoned guard still holds a consistent ledger.
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get_account(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        ctx.run(async {
            Ok(self
                .ledger()
                .accounts
                .get(&account_id)
                .map(|balance| Account::new(account_id, *balance)))
        })
        .await
    }

    async fn create_account(&self, ctx: &OpContext, account: &Account) -> Result<(), StoreError> {
        ctx.run(async {
            let mut ledger = self.ledger();
            if ledger.accounts.contains_key(&account.account_id) {
                return Err(StoreError::AlreadyExists(account.account_id));
            }
            ledger.accounts.insert(account.account_id, account.balance);
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
            let mut ledger = self.ledger();
            let balance = ledger
                .accounts
                .get_mut(&account_id)
                .ok_or(StoreError::NotFound(account_id))?;
            *balance = new_balance;
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
            let mut ledger = self.ledger();
            if ledger.recorded.insert(key) {
                ledger.transactions.push(transaction.clone());
            }
            Ok(())
        })
        .await
    }
}
