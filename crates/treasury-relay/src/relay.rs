//! At-least-once message relay between the source outbox and the vault.
//!
//! The relay behaves like a real messaging layer would at its worst: it can
//! deliver a message more than once and in any order. Correctness rests on
//! the vault's invoice dedup, not on the relay.
//!
//! A delivery that fails with `InsufficientVaultBalance` is retried with
//! back-off; if the vault is still short after the last attempt the message
//! is parked as stalled until [`MessageRelay::redeliver_stalled`].
//!
//! A duplicate only counts as delivered for the payment whose record the
//! vault holds. Another payment reusing a settled invoice stays `Dispatched`
//! and is reported as superseded.

use std::{future, sync::Arc};

use parking_lot::Mutex;
use rand::{Rng, seq::SliceRandom};
use serde::Serialize;
use tokio::task::JoinSet;
use treasury_ledger::{Outbox, PaymentDispatcher};
use treasury_settlement::SettlementVault;
use treasury_types::{DeliveryOutcome, OutboundMessage, PaymentState, Result, TreasuryError};

use crate::{committee::VerifierCommittee, retry::RetryPolicy};

/// Transport misbehaviour to simulate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayOptions {
    /// Probability in `[0, 1]` that a message is delivered one extra time.
    pub duplicate_rate: f64,
    /// Shuffle deliveries within each pump.
    pub reorder: bool,
}

impl RelayOptions {
    /// # Errors
    /// Returns `Configuration` unless `duplicate_rate` is a finite value in `[0, 1]`.
    pub fn new(duplicate_rate: f64, reorder: bool) -> Result<Self> {
        if !(0.0..=1.0).contains(&duplicate_rate) {
            return Err(TreasuryError::Configuration(format!(
                "duplicate rate {duplicate_rate} must be between 0 and 1"
            )));
        }
        Ok(Self {
            duplicate_rate,
            reorder,
        })
    }
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            duplicate_rate: 0.0,
            reorder: false,
        }
    }
}

/// Outcome counts for one pump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    /// Delivery attempts handed to the vault, duplicates included.
    pub deliveries: usize,
    pub executed: usize,
    pub duplicates: usize,
    /// Payments whose invoice was already settled by a different payment.
    pub superseded: usize,
    pub stalled: usize,
    pub rejected: usize,
}

enum Delivered {
    Executed,
    Duplicate,
    Superseded,
    Stalled(OutboundMessage),
    Rejected,
}

#[derive(Clone)]
pub struct MessageRelay {
    outbox: Arc<Outbox>,
    committee: Arc<VerifierCommittee>,
    vault: Arc<SettlementVault>,
    dispatcher: Arc<PaymentDispatcher>,
    retry: RetryPolicy,
    options: RelayOptions,
    stalled: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl MessageRelay {
    #[must_use]
    pub fn new(
        outbox: Arc<Outbox>,
        committee: Arc<VerifierCommittee>,
        vault: Arc<SettlementVault>,
        dispatcher: Arc<PaymentDispatcher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            outbox,
            committee,
            vault,
            dispatcher,
            retry,
            options: RelayOptions::default(),
            stalled: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: RelayOptions) -> Self {
        self.options = options;
        self
    }

    /// Messages waiting for the vault to be topped up.
    #[must_use]
    pub fn stalled_count(&self) -> usize {
        self.stalled.lock().len()
    }

    /// Deliver everything currently in the outbox.
    pub async fn pump(&self) -> RelayReport {
        let messages = self.outbox.drain();
        self.deliver_all(messages).await
    }

    /// Try stalled messages again, e.g. after a vault top-up.
    pub async fn redeliver_stalled(&self) -> RelayReport {
        let messages = std::mem::take(&mut *self.stalled.lock());
        self.deliver_all(messages).await
    }

    async fn deliver_all(&self, messages: Vec<OutboundMessage>) -> RelayReport {
        let deliveries = self.schedule(messages);
        let mut report = RelayReport {
            deliveries: deliveries.len(),
            ..RelayReport::default()
        };

        let mut tasks = JoinSet::new();
        for message in deliveries {
            let relay = self.clone();
            tasks.spawn(async move { relay.deliver(message).await });
        }

        let mut parked: Vec<OutboundMessage> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Delivered::Executed) => report.executed += 1,
                Ok(Delivered::Duplicate) => report.duplicates += 1,
                Ok(Delivered::Superseded) => report.superseded += 1,
                Ok(Delivered::Stalled(message)) => {
                    report.stalled += 1;
                    if !parked.iter().any(|m| m.digest() == message.digest()) {
                        parked.push(message);
                    }
                }
                Ok(Delivered::Rejected) => report.rejected += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Delivery task aborted");
                    report.rejected += 1;
                }
            }
        }
        self.stalled.lock().extend(parked);

        tracing::info!(
            deliveries = report.deliveries,
            executed = report.executed,
            duplicates = report.duplicates,
            superseded = report.superseded,
            stalled = report.stalled,
            rejected = report.rejected,
            "Relay pump finished"
        );
        report
    }

    /// Apply duplication and reordering.
    fn schedule(&self, messages: Vec<OutboundMessage>) -> Vec<OutboundMessage> {
        let mut rng = rand::thread_rng();
        let rate = if self.options.duplicate_rate.is_nan() {
            0.0
        } else {
            self.options.duplicate_rate.clamp(0.0, 1.0)
        };
        let mut deliveries = Vec::with_capacity(messages.len());
        for message in messages {
            if rng.gen_bool(rate) {
                deliveries.push(message.clone());
            }
            deliveries.push(message);
        }
        if self.options.reorder {
            deliveries.shuffle(&mut rng);
        }
        deliveries
    }

    async fn deliver(&self, message: OutboundMessage) -> Delivered {
        let proof = self.committee.prove(&message);
        let (owner, nonce) = (message.source.owner, message.source.nonce);

        let result = self
            .retry
            .run("deliver", |_| {
                let outcome = self.vault.deliver(&message, &proof);
                if matches!(outcome, Err(TreasuryError::InsufficientVaultBalance { .. })) {
                    self.dispatcher.advance(owner, nonce, PaymentState::Stalled);
                }
                future::ready(outcome)
            })
            .await;

        match result {
            Ok(DeliveryOutcome::Executed { .. }) => {
                self.dispatcher.advance(owner, nonce, PaymentState::Delivered);
                Delivered::Executed
            }
            Ok(DeliveryOutcome::Duplicate) => {
                let settled_by = self.vault.settled_by(&message.invoice_id);
                if settled_by == Some(message.source) {
                    self.dispatcher.advance(owner, nonce, PaymentState::Delivered);
                    Delivered::Duplicate
                } else {
                    // Funds stay escrowed at the source; the payment is not delivered.
                    tracing::warn!(
                        invoice = %message.invoice_id.short(),
                        owner = %owner,
                        nonce = %nonce,
                        "Invoice already settled by another payment"
                    );
                    Delivered::Superseded
                }
            }
            Err(TreasuryError::InsufficientVaultBalance { .. }) => Delivered::Stalled(message),
            Err(e) => {
                tracing::error!(invoice = %message.invoice_id.short(), error = %e, "Delivery rejected");
                Delivered::Rejected
            }
        }
    }
}
