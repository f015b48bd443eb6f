//! Invoice index: each invoice is settled at most once.
//!
//! Entries are never evicted. A bounded cache would let a late duplicate of
//! an evicted invoice pay out twice, so growth is accepted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use treasury_types::{InvoiceId, Result, TreasuryError};

/// Where and when an invoice was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceEntry {
    /// Index of the payment record in the vault history.
    pub history_index: u64,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InvoiceIndex {
    processed: HashMap<InvoiceId, InvoiceEntry>,
}

impl InvoiceIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an invoice as settled by the record at `history_index`.
    ///
    /// # Errors
    /// Returns [`TreasuryError::InvoiceAlreadyProcessed`] if it was marked before.
    pub fn mark_processed(&mut self, invoice_id: InvoiceId, history_index: u64) -> Result<()> {
        if self.processed.contains_key(&invoice_id) {
            return Err(TreasuryError::InvoiceAlreadyProcessed(invoice_id));
        }
        self.processed.insert(
            invoice_id,
            InvoiceEntry {
                history_index,
                processed_at: Utc::now(),
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn is_processed(&self, invoice_id: &InvoiceId) -> bool {
        self.processed.contains_key(invoice_id)
    }

    #[must_use]
    pub fn entry(&self, invoice_id: &InvoiceId) -> Option<InvoiceEntry> {
        self.processed.get(invoice_id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}
