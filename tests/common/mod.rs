//! Shared fixtures for the integration tests.
//!
//! [`FaultyStore`] wraps the in-memory ledger and injects scripted failures
//! into chosen store calls. [`AtomicMemoryStore`] stands in for a store with
//! transaction support so the atomic transfer path can run without a database.
//! Both honour the transfer key the same way the Postgres store does.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use internal_transfers::{
    audit::{AuditLog, RecordingAuditLog},
    context::OpContext,
    error::StoreError,
    models::{
        account::{Account, AccountId},
        transaction::{Transaction, TransferKey},
    },
    services::{AccountLocks, AccountService, LedgerSettings, RetryPolicy, TransferService},
    store::{AtomicTransfer, LedgerStore, MemoryLedgerStore},
};

/// Retry settings with delays short enough for tests.
pub fn fast_settings() -> LedgerSettings {
    LedgerSettings {
        retry: RetryPolicy::new(2, Duration::from_millis(5)),
        store_timeout: Duration::from_secs(2),
    }
}

pub fn transfer_service(
    store: Arc<dyn LedgerStore>,
    audit: Arc<RecordingAuditLog>,
    settings: LedgerSettings,
) -> TransferService {
    let audit: Arc<dyn AuditLog> = audit;
    TransferService::new(store, Arc::new(AccountLocks::new()), audit, settings)
}

pub fn account_service(
    store: Arc<dyn LedgerStore>,
    audit: Arc<RecordingAuditLog>,
    settings: LedgerSettings,
) -> AccountService {
    let audit: Arc<dyn AuditLog> = audit;
    AccountService::new(store, Arc::new(AccountLocks::new()), audit, settings)
}

/// Store call kinds a fault can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Get,
    Create,
    Update,
    Append,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    /// Fail without touching the ledger.
    Fail(fn() -> StoreError),
    /// Apply the call, then report failure (a timeout after commit).
    FailAfterWrite(fn() -> StoreError),
    /// Block until the context deadline or cancellation fires.
    Stall,
}

#[derive(Debug)]
struct Fault {
    call: Call,
    nth: u32,
    action: Action,
}

/// In-memory ledger with scripted faults.
///
/// Faults address the `nth` call (1-based) of a given kind, counted across
/// the store's whole lifetime, retries and restores included.
#[derive(Debug, Default)]
pub struct FaultyStore {
    pub inner: MemoryLedgerStore,
    faults: Mutex<Vec<Fault>>,
    counts: Mutex<HashMap<Call, u32>>,
}

impl FaultyStore {
    pub fn new(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            inner: MemoryLedgerStore::with_accounts(accounts),
            ..Self::default()
        }
    }

    pub fn fail(self, call: Call, nth: u32, error: fn() -> StoreError) -> Self {
        self.script(call, nth, Action::Fail(error))
    }

    pub fn fail_after_write(self, call: Call, nth: u32, error: fn() -> StoreError) -> Self {
        self.script(call, nth, Action::FailAfterWrite(error))
    }

    pub fn stall(self, call: Call, nth: u32) -> Self {
        self.script(call, nth, Action::Stall)
    }

    /// How many calls of this kind the store has seen.
    pub fn calls(&self, call: Call) -> u32 {
        self.counts.lock().unwrap().get(&call).copied().unwrap_or(0)
    }

    fn script(self, call: Call, nth: u32, action: Action) -> Self {
        self.faults.lock().unwrap().push(Fault { call, nth, action });
        self
    }

    fn next(&self, call: Call) -> Option<Action> {
        let nth = {
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(call).or_default();
            *count += 1;
            *count
        };

        self.faults
            .lock()
            .unwrap()
            .iter()
            .find(|fault| fault.call == call && fault.nth == nth)
            .map(|fault| fault.action)
    }
}

async fn stall(ctx: &OpContext) -> Result<(), StoreError> {
    ctx.run(async {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(())
    })
    .await
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn get_account(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        match self.next(Call::Get) {
            Some(Action::Fail(error)) => Err(error()),
            Some(Action::FailAfterWrite(error)) => {
                self.inner.get_account(ctx, account_id).await?;
                Err(error())
            }
            Some(Action::Stall) => {
                stall(ctx).await?;
                self.inner.get_account(ctx, account_id).await
            }
            None => self.inner.get_account(ctx, account_id).await,
        }
    }

    async fn create_account(&self, ctx: &OpContext, account: &Account) -> Result<(), StoreError> {
        match self.next(Call::Create) {
            Some(Action::Fail(error)) => Err(error()),
            Some(Action::FailAfterWrite(error)) => {
                self.inner.create_account(ctx, account).await?;
                Err(error())
            }
            Some(Action::Stall) => {
                stall(ctx).await?;
                self.inner.create_account(ctx, account).await
            }
            None => self.inner.create_account(ctx, account).await,
        }
    }

    async fn update_balance(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
        new_balance: Decimal,
    ) -> Result<(), StoreError> {
        match self.next(Call::Update) {
            Some(Action::Fail(error)) => Err(error()),
            Some(Action::FailAfterWrite(error)) => {
                self.inner
                    .update_balance(ctx, account_id, new_balance)
                    .await?;
                Err(error())
            }
            Some(Action::Stall) => {
                stall(ctx).await?;
                self.inner.update_balance(ctx, account_id, new_balance).await
            }
            None => self.inner.update_balance(ctx, account_id, new_balance).await,
        }
    }

    async fn append_transaction(
        &self,
        ctx: &OpContext,
        key: TransferKey,
        transaction: &Transaction,
    ) -> Result<(), StoreError> {
        match self.next(Call::Append) {
            Some(Action::Fail(error)) => Err(error()),
            Some(Action::FailAfterWrite(error)) => {
                self.inner.append_transaction(ctx, key, transaction).await?;
                Err(error())
            }
            Some(Action::Stall) => {
                stall(ctx).await?;
                self.inner.append_transaction(ctx, key, transaction).await
            }
            None => self.inner.append_transaction(ctx, key, transaction).await,
        }
    }
}

/// Store that advertises transaction support.
///
/// `apply_transfer` runs the whole transfer under one mutex, with the same
/// precondition order a database implementation uses. The first
/// `deadlocks` calls fail with `DeadlockDetected` before touching anything.
/// The first `lost_commits` calls that get as far as committing report
/// `DeadlineExceeded` anyway, as if the acknowledgement never arrived.
#[derive(Debug, Default)]
pub struct AtomicMemoryStore {
    pub inner: MemoryLedgerStore,
    serial: tokio::sync::Mutex<()>,
    committed: Mutex<HashSet<TransferKey>>,
    deadlocks: AtomicU32,
    lost_commits: AtomicU32,
    pub calls: AtomicU32,
    pub applied: AtomicU32,
}

impl AtomicMemoryStore {
    pub fn new(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            inner: MemoryLedgerStore::with_accounts(accounts),
            ..Self::default()
        }
    }

    pub fn with_deadlocks(self, count: u32) -> Self {
        self.deadlocks.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_lost_commits(self, count: u32) -> Self {
        self.lost_commits.store(count, Ordering::SeqCst);
        self
    }
}

/// Take one from `counter` if it is above zero.
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl LedgerStore for AtomicMemoryStore {
    async fn get_account(
        &self,
        ctx: &OpContext,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        self.inner.get_account(ctx, account_id).await
    }

    async fn create_account(&self, ctx: &OpContext, account: &Account) -> Result<(), StoreError> {
        self.inner.create_account(ctx, account).await
    }

    async fn update_balance(
        &self,
        _ctx: &OpContext,
        _account_id: AccountId,
        _new_balance: Decimal,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(
            "individual writes are not used on the atomic path".into(),
        ))
    }

    async fn append_transaction(
        &self,
        _ctx: &OpContext,
        _key: TransferKey,
        _transaction: &Transaction,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(
            "individual writes are not used on the atomic path".into(),
        ))
    }

    fn atomic_transfers(&self) -> Option<&dyn AtomicTransfer> {
        Some(self)
    }
}

#[async_trait]
impl AtomicTransfer for AtomicMemoryStore {
    async fn apply_transfer(
        &self,
        ctx: &OpContext,
        key: TransferKey,
        transfer: &Transaction,
    ) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.deadlocks) {
            return Err(StoreError::DeadlockDetected);
        }

        let _serial = self.serial.lock().await;

        if self.committed.lock().unwrap().contains(&key) {
            return Ok(());
        }

        let source = self
            .inner
            .get_account(ctx, transfer.source_account_id)
            .await?
            .ok_or(StoreError::NotFound(transfer.source_account_id))?;
        if source.balance < transfer.amount {
            return Err(StoreError::InsufficientBalance {
                account_id: source.account_id,
                balance: source.balance,
            });
        }
        let destination = self
            .inner
            .get_account(ctx, transfer.destination_account_id)
            .await?
            .ok_or(StoreError::NotFound(transfer.destination_account_id))?;

        self.inner
            .update_balance(ctx, source.account_id, source.balance - transfer.amount)
            .await?;
        self.inner
            .update_balance(
                ctx,
                destination.account_id,
                destination.balance + transfer.amount,
            )
            .await?;
        self.inner.append_transaction(ctx, key, transfer).await?;

        self.committed.lock().unwrap().insert(key);
        self.applied.fetch_add(1, Ordering::SeqCst);

        if take_one(&self.lost_commits) {
            return Err(StoreError::DeadlineExceeded);
        }
        Ok(())
    }
}
