//! Double-entry postings and batches.
//!
//! A [`Batch`] is the unit of commitment on the ledger: an ordered list of
//! [`Posting`]s that must balance per token. Balance is checked before any
//! posting is applied, and a committed batch is never mutated.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, Amount, BatchId, InvoiceId, Result, Token, TreasuryError, checked_add};

/// Which leg of an entry a posting is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostingSide {
    Debit,
    Credit,
}

impl PostingSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Debit => Self::Credit,
            Self::Credit => Self::Debit,
        }
    }
}

impl std::fmt::Display for PostingSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debit => write!(f, "DEBIT"),
            Self::Credit => write!(f, "CREDIT"),
        }
    }
}

/// One leg of a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub account: Address,
    pub token: Token,
    pub amount: Amount,
    pub side: PostingSide,
}

impl Posting {
    #[must_use]
    pub fn debit(account: Address, token: impl Into<Token>, amount: Amount) -> Self {
        Self {
            account,
            token: token.into(),
            amount,
            side: PostingSide::Debit,
        }
    }

    #[must_use]
    pub fn credit(account: Address, token: impl Into<Token>, amount: Amount) -> Self {
        Self {
            account,
            token: token.into(),
            amount,
            side: PostingSide::Credit,
        }
    }

    #[must_use]
    pub fn is_debit(&self) -> bool {
        self.side == PostingSide::Debit
    }

    /// The same leg on the other side, used to build compensating batches.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            side: self.side.opposite(),
            ..self.clone()
        }
    }
}

/// Metadata recorded with every batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMeta {
    /// Free-form purpose ("Cloud hosting - November").
    pub intent: String,
    /// Identity of the agent that authorized the batch.
    pub agent: Address,
    /// Oracle price accepted by the price gate, if the batch was gated.
    pub price_at_execution: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    pub invoice_id: Option<InvoiceId>,
}

impl BatchMeta {
    #[must_use]
    pub fn new(intent: impl Into<String>, agent: Address) -> Self {
        Self {
            intent: intent.into(),
            agent,
            price_at_execution: None,
            timestamp: Utc::now(),
            invoice_id: None,
        }
    }

    #[must_use]
    pub fn with_price(mut self, price: Option<Decimal>) -> Self {
        self.price_at_execution = price;
        self
    }

    #[must_use]
    pub fn with_invoice(mut self, invoice_id: InvoiceId) -> Self {
        self.invoice_id = Some(invoice_id);
        self
    }
}

/// Per-token debit and credit sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenTotals {
    pub debits: Amount,
    pub credits: Amount,
}

/// Sum debits and credits per token.
///
/// # Errors
/// Returns [`TreasuryError::InvalidAmount`] on overflow.
pub fn token_totals(postings: &[Posting]) -> Result<BTreeMap<Token, TokenTotals>> {
    let mut totals: BTreeMap<Token, TokenTotals> = BTreeMap::new();
    for posting in postings {
        let entry = totals.entry(posting.token.clone()).or_default();
        match posting.side {
            PostingSide::Debit => entry.debits = checked_add(entry.debits, posting.amount)?,
            PostingSide::Credit => entry.credits = checked_add(entry.credits, posting.amount)?,
        }
    }
    Ok(totals)
}

/// Structural checks every batch must pass before it may touch balances:
/// non-empty, no zero legs, debits equal credits for every token.
///
/// # Errors
/// - `InvalidAmount` for empty batches, zero-amount postings or overflow
/// - `UnbalancedBatch` naming the first token whose sides differ
pub fn check_balanced(postings: &[Posting]) -> Result<()> {
    if postings.is_empty() {
        return Err(TreasuryError::InvalidAmount {
            reason: "batch has no postings".to_string(),
        });
    }
    if let Some(p) = postings.iter().find(|p| p.amount == 0) {
        return Err(TreasuryError::InvalidAmount {
            reason: format!("zero-amount {} posting for {} on {}", p.side, p.token, p.account),
        });
    }
    for (token, totals) in token_totals(postings)? {
        if totals.debits != totals.credits {
            return Err(TreasuryError::UnbalancedBatch {
                token,
                debits: totals.debits,
                credits: totals.credits,
            });
        }
    }
    Ok(())
}

/// A committed, immutable ledger batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    /// Position in the ledger's commit order (0-based).
    pub sequence: u64,
    pub postings: Vec<Posting>,
    pub meta: BatchMeta,
    /// Set when this batch is the compensation of an earlier one.
    pub compensates: Option<BatchId>,
    pub committed_at: DateTime<Utc>,
}

impl Batch {
    /// Re-check the balance invariant on a committed batch.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        check_balanced(&self.postings).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address([1; 20])
    }

    fn bob() -> Address {
        Address([2; 20])
    }

    #[test]
    fn balanced_pair_passes() {
        let postings = vec![Posting::debit(alice(), "ETH", 100), Posting::credit(bob(), "ETH", 100)];
        assert!(check_balanced(&postings).is_ok());
    }

    #[test]
    fn unbalanced_pair_names_token() {
        let postings = vec![Posting::debit(alice(), "ETH", 100), Posting::credit(bob(), "ETH", 90)];
        let err = check_balanced(&postings).unwrap_err();
        assert!(matches!(
            err,
            TreasuryError::UnbalancedBatch { ref token, debits: 100, credits: 90 } if token == "ETH"
        ));
    }

    #[test]
    fn balance_is_checked_per_token() {
        // 100 ETH out, 100 USDC in: totals match numerically but not per token.
        let postings = vec![Posting::debit(alice(), "ETH", 100), Posting::credit(bob(), "USDC", 100)];
        assert!(matches!(
            check_balanced(&postings).unwrap_err(),
            TreasuryError::UnbalancedBatch { .. }
        ));
    }

    #[test]
    fn multi_leg_batch_balances() {
        let carol = Address([3; 20]);
        let postings = vec![
            Posting::debit(alice(), "ETH", 70),
            Posting::debit(bob(), "ETH", 30),
            Posting::credit(carol, "ETH", 100),
        ];
        assert!(check_balanced(&postings).is_ok());
        let totals = token_totals(&postings).unwrap();
        assert_eq!(totals["ETH"].debits, 100);
        assert_eq!(totals["ETH"].credits, 100);
    }

    #[test]
    fn empty_and_zero_batches_rejected() {
        assert!(matches!(
            check_balanced(&[]).unwrap_err(),
            TreasuryError::InvalidAmount { .. }
        ));
        let postings = vec![Posting::debit(alice(), "ETH", 0), Posting::credit(bob(), "ETH", 0)];
        assert!(matches!(
            check_balanced(&postings).unwrap_err(),
            TreasuryError::InvalidAmount { .. }
        ));
    }

    #[test]
    fn reversed_posting_flips_side_only() {
        let p = Posting::debit(alice(), "ETH", 5);
        let r = p.reversed();
        assert_eq!(r.side, PostingSide::Credit);
        assert_eq!(r.account, p.account);
        assert_eq!(r.amount, p.amount);
    }
}
