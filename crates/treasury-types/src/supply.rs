//! Supply conservation invariant checker.
//!
//! Invariant enforced after every commit, on both sides of the bridge:
//! ```text
//! ∀ token: Σ(balances) == Σ(deposits) - Σ(withdrawals)
//! ```
//!
//! Internal transfers (batches, vault releases) move value between accounts
//! and never change the identity. If it breaks, value was created or
//! destroyed by a bug.

use std::collections::{BTreeSet, HashMap};

use crate::{Amount, Result, Token, TreasuryError, checked_add};

/// Tracks per-token external inflows and outflows.
#[derive(Debug, Default)]
pub struct SupplyConservation {
    /// Total deposits per token since genesis.
    deposits: HashMap<Token, Amount>,
    /// Total withdrawals per token since genesis.
    withdrawals: HashMap<Token, Amount>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an external inflow.
    ///
    /// # Errors
    /// Returns `InvalidAmount` on overflow; the tally is unchanged.
    pub fn record_deposit(&mut self, token: &str, amount: Amount) -> Result<()> {
        let total = self.deposits.entry(token.to_string()).or_insert(0);
        *total = checked_add(*total, amount)?;
        Ok(())
    }

    /// Record an external outflow.
    ///
    /// # Errors
    /// Returns `InvalidAmount` on overflow; the tally is unchanged.
    pub fn record_withdrawal(&mut self, token: &str, amount: Amount) -> Result<()> {
        let total = self.withdrawals.entry(token.to_string()).or_insert(0);
        *total = checked_add(*total, amount)?;
        Ok(())
    }

    /// Expected total supply for a token: deposits - withdrawals.
    ///
    /// # Errors
    /// Returns `SupplyInvariantViolation` if more left than ever came in.
    pub fn expected_supply(&self, token: &str) -> Result<Amount> {
        let deposited = self.total_deposits(token);
        let withdrawn = self.total_withdrawals(token);
        deposited
            .checked_sub(withdrawn)
            .ok_or_else(|| TreasuryError::SupplyInvariantViolation {
                reason: format!("{token}: withdrawals {withdrawn} exceed deposits {deposited}"),
            })
    }

    /// Verify that the actual supply (sum of all balances) matches the
    /// expected supply for a token.
    ///
    /// # Errors
    /// Returns [`TreasuryError::SupplyInvariantViolation`] if actual ≠ expected.
    pub fn verify(&self, token: &str, actual_supply: Amount) -> Result<()> {
        let expected = self.expected_supply(token)?;
        if actual_supply != expected {
            return Err(TreasuryError::SupplyInvariantViolation {
                reason: format!(
                    "{token}: actual supply {actual_supply} != expected {expected} \
                     (deposits={}, withdrawals={})",
                    self.total_deposits(token),
                    self.total_withdrawals(token),
                ),
            });
        }
        Ok(())
    }

    /// All tokens that ever moved in or out, sorted.
    #[must_use]
    pub fn tracked_tokens(&self) -> Vec<Token> {
        let tokens: BTreeSet<&Token> = self.deposits.keys().chain(self.withdrawals.keys()).collect();
        tokens.into_iter().cloned().collect()
    }

    #[must_use]
    pub fn total_deposits(&self, token: &str) -> Amount {
        self.deposits.get(token).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_withdrawals(&self, token: &str) -> Amount {
        self.withdrawals.get(token).copied().unwrap_or(0)
    }
}
