//! Internal transfers ledger.
//!
//! Maintains monetary accounts and moves funds between them. The transfer core
//! debits one account, credits another and records the transaction, leaving
//! the ledger consistent under partial failure and transient storage errors.
//!
//! # Architecture
//!
//! - **Ledger Store** ([`store`]): accounts and the transaction log, behind the
//!   [`store::LedgerStore`] trait (PostgreSQL or in-memory)
//! - **Retry Policy** ([`services::retry`]): bounded replay of deadline and
//!   deadlock failures
//! - **Transfer Orchestrator** ([`services::TransferService`])
//! - **Account Lifecycle Manager** ([`services::AccountService`])
//! - **HTTP API** ([`handlers`]): Axum routes over the two services
//!
//! Money is `rust_decimal::Decimal` throughout.

pub mod audit;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;
