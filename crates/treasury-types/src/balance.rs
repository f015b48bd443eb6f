//! Balance types for the double-entry ledger and the vault.
//!
//! Amounts are integer base units (wei-style). Balances are never negative,
//! so an unsigned type is enough; every mutation goes through checked
//! arithmetic.

use serde::{Deserialize, Serialize};

use crate::{Address, Result, TreasuryError};

/// Integer amount in token base units.
pub type Amount = u128;

/// Token identifier (e.g. "ETH", "USDC").
pub type Token = String;

/// A single balance snapshot for an (account, token) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub account: Address,
    pub token: Token,
    pub amount: Amount,
}

/// `a + b`, or `InvalidAmount` on overflow.
///
/// # Errors
/// Returns [`TreasuryError::InvalidAmount`] when the sum overflows.
pub fn checked_add(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_add(b).ok_or_else(|| TreasuryError::InvalidAmount {
        reason: format!("amount overflow: {a} + {b}"),
    })
}
