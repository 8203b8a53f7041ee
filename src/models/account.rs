//! Account data models and API request types.
//!
//! This module defines:
//! - `Account`: Ledger entity holding a balance
//! - `CreateAccountRequest`: Request body for creating accounts
//! - `UpdateBalanceRequest`: Request body for administrative balance corrections

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Caller-assigned account identifier.
pub type AccountId = i64;

/// Represents an account record in the ledger.
///
/// # Database Table
///
/// Maps to the `accounts` table. Each account:
/// - Is identified by a caller-assigned id that never changes
/// - Holds an exact decimal balance (never a float)
///
/// # Balance Invariant
///
/// The balance is never negative outside an in-flight transfer. The database
/// enforces this with a CHECK constraint; the services enforce it before
/// writing.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for this account
    pub account_id: AccountId,

    /// Current balance
    ///
    /// Serialized as a string (`"100.00"`) so no precision is lost in JSON.
    pub balance: Decimal,
}

impl Account {
    pub fn new(account_id: AccountId, balance: Decimal) -> Self {
        Self {
            account_id,
            balance,
        }
    }
}

/// Request body for creating a new account.
///
/// # JSON Example
///
/// ```json
/// {
///   "account_id": 1,
///   "initial_balance": "100.00"
/// }
/// ```
///
/// # Validation
///
/// - `account_id`: Required, must not already exist
/// - `initial_balance`: Required, must be zero or positive
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub account_id: AccountId,
    pub initial_balance: Decimal,
}

/// Request body for overwriting an account balance.
///
/// This is an administrative correction and bypasses transfer semantics.
#[derive(Debug, Deserialize)]
pub struct UpdateBalanceRequest {
    pub balance: Decimal,
}
