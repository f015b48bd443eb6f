//! Settlement vault: the destination-side receiver.
//!
//! The vault holds a pool of funds per token. Each authenticated delivery
//! releases `amount` from the pool to the recipient, records a
//! [`PaymentRecord`], and marks the invoice processed, all under one lock.
//!
//! ## Delivery rules
//!
//! 1. The proof must authenticate the message, else `InvalidProof`.
//! 2. An already-processed invoice is a successful no-op (`Duplicate`).
//! 3. If the pool cannot cover the amount, `InsufficientVaultBalance` is
//!    returned and nothing changes; the invoice stays unprocessed so a
//!    redelivery after a top-up succeeds.
//! 4. Otherwise release, record and mark atomically.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use treasury_types::{
    Address, Amount, DeliveryOutcome, DeliveryProof, DestinationId, InvoiceId, OutboundMessage,
    PaymentRecord, Result, SourceRef, SupplyConservation, Token, TreasuryError, VaultConfig,
    checked_add,
};

use crate::{
    invoice_index::InvoiceIndex,
    proof::{ProofVerifier, ThresholdSignatureVerifier},
};

#[derive(Debug, Default)]
struct VaultState {
    /// Pool balance per token.
    pool: HashMap<Token, Amount>,
    /// Total released to each recipient, per token.
    paid_out: HashMap<(Address, Token), Amount>,
    history: Vec<PaymentRecord>,
    invoices: InvoiceIndex,
    /// Top-ups are inflows; releases are outflows.
    supply: SupplyConservation,
}

impl VaultState {
    fn pool_balance(&self, token: &str) -> Amount {
        self.pool.get(token).copied().unwrap_or(0)
    }
}

pub struct SettlementVault {
    verifier: Box<dyn ProofVerifier>,
    destination: Option<DestinationId>,
    state: Mutex<VaultState>,
}

impl SettlementVault {
    #[must_use]
    pub fn new(verifier: impl ProofVerifier + 'static) -> Self {
        Self {
            verifier: Box::new(verifier),
            destination: None,
            state: Mutex::new(VaultState::default()),
        }
    }

    /// # Errors
    /// Returns `Configuration` for bad verifier keys or threshold.
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        let vault = Self::new(ThresholdSignatureVerifier::from_config(config)?);
        Ok(match config.destination {
            Some(destination) => vault.for_destination(destination),
            None => vault,
        })
    }

    /// Refuse messages addressed to any other destination.
    #[must_use]
    pub fn for_destination(mut self, destination: DestinationId) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Add funds to the pool.
    ///
    /// # Errors
    /// `InvalidAmount` for zero or overflow.
    pub fn top_up(&self, token: &str, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(TreasuryError::InvalidAmount {
                reason: "top-up amount must be positive".to_string(),
            });
        }
        let mut state = self.state.lock();
        let next = checked_add(state.pool_balance(token), amount)?;
        state.supply.record_deposit(token, amount)?;
        state.pool.insert(token.to_string(), next);
        tracing::info!(token, amount, balance = next, "Vault topped up");
        Ok(())
    }

    /// Settle a delivered message. Safe to call any number of times with the
    /// same message.
    ///
    /// # Errors
    /// - `InvalidProof` if the proof does not authenticate the message
    /// - `InsufficientVaultBalance` if the pool cannot cover it (retryable)
    pub fn deliver(&self, message: &OutboundMessage, proof: &DeliveryProof) -> Result<DeliveryOutcome> {
        if let Err(e) = self.verifier.verify(message, proof) {
            tracing::warn!(invoice = %message.invoice_id.short(), error = %e, "Delivery rejected");
            return Err(e);
        }
        if let Some(destination) = self.destination {
            if message.destination != destination {
                return Err(TreasuryError::InvalidProof {
                    reason: format!("message for {} delivered to {destination}", message.destination),
                });
            }
        }

        let mut state = self.state.lock();
        if state.invoices.is_processed(&message.invoice_id) {
            tracing::info!(
                invoice = %message.invoice_id.short(),
                source_nonce = %message.source.nonce,
                "Duplicate delivery ignored"
            );
            return Ok(DeliveryOutcome::Duplicate);
        }

        let available = state.pool_balance(&message.token);
        let Some(remaining) = available.checked_sub(message.amount) else {
            tracing::warn!(
                invoice = %message.invoice_id.short(),
                token = %message.token,
                needed = message.amount,
                available,
                "Vault short; delivery stalled"
            );
            return Err(TreasuryError::InsufficientVaultBalance {
                token: message.token.clone(),
                needed: message.amount,
                available,
            });
        };

        let payee = (message.recipient, message.token.clone());
        let paid = checked_add(state.paid_out.get(&payee).copied().unwrap_or(0), message.amount)?;
        let index = state.history.len() as u64;

        // Claim the invoice before any funds move. The withdrawal tally
        // cannot overflow: it stays below top-ups while the pool covers the amount.
        state.invoices.mark_processed(message.invoice_id, index)?;
        state.supply.record_withdrawal(&message.token, message.amount)?;
        state.pool.insert(message.token.clone(), remaining);
        state.paid_out.insert(payee, paid);
        state.history.push(PaymentRecord {
            recipient: message.recipient,
            token: message.token.clone(),
            amount: message.amount,
            invoice_id: message.invoice_id,
            intent: message.intent.clone(),
            source: message.source,
            timestamp: message.created_at,
            executed_at: Utc::now(),
        });

        tracing::info!(
            invoice = %message.invoice_id.short(),
            recipient = %message.recipient,
            token = %message.token,
            amount = message.amount,
            index,
            "Payment executed"
        );
        Ok(DeliveryOutcome::Executed { index })
    }

    // ---- Views ----

    #[must_use]
    pub fn vault_balance(&self, token: &str) -> Amount {
        self.state.lock().pool_balance(token)
    }

    #[must_use]
    pub fn payment_count(&self) -> u64 {
        self.state.lock().history.len() as u64
    }

    /// # Errors
    /// Returns `PaymentNotFound` if `index >= payment_count()`.
    pub fn payment_history(&self, index: u64) -> Result<PaymentRecord> {
        let state = self.state.lock();
        usize::try_from(index)
            .ok()
            .and_then(|i| state.history.get(i))
            .cloned()
            .ok_or(TreasuryError::PaymentNotFound(index))
    }

    /// Total released to `recipient` in `token`.
    #[must_use]
    pub fn paid_to(&self, recipient: Address, token: &str) -> Amount {
        self.state
            .lock()
            .paid_out
            .get(&(recipient, token.to_string()))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_processed(&self, invoice_id: &InvoiceId) -> bool {
        self.state.lock().invoices.is_processed(invoice_id)
    }

    /// The source payment whose delivery settled `invoice_id`, if any.
    #[must_use]
    pub fn settled_by(&self, invoice_id: &InvoiceId) -> Option<SourceRef> {
        let state = self.state.lock();
        let entry = state.invoices.entry(invoice_id)?;
        let index = usize::try_from(entry.history_index).ok()?;
        state.history.get(index).map(|record| record.source)
    }

    /// Check pool == top-ups − releases for every token.
    ///
    /// # Errors
    /// `SupplyInvariantViolation` naming the first broken token.
    pub fn verify_supply(&self) -> Result<()> {
        let state = self.state.lock();
        for token in state.supply.tracked_tokens() {
            state.supply.verify(&token, state.pool_balance(&token))?;
        }
        Ok(())
    }
}
