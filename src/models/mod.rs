//! Data models representing ledger entities.
//!
//! This module contains the data structures stored by the ledger and the
//! request bodies the HTTP layer accepts.

/// Account model and account request bodies
pub mod account;
/// Transaction record and transfer request body
pub mod transaction;
