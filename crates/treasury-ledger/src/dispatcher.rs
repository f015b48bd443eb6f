//! Payment dispatcher: turns an authorized payment intent into one ledger
//! batch and exactly one outbound cross-chain message.
//!
//! ## Dispatch pipeline
//!
//! ```text
//!   authorize caller ─▶ reserve (owner, nonce) ─▶ price gate (gated routes)
//!        ─▶ post batch [treasury → settlement] + fee check ─▶ emit message
//! ```
//!
//! Once the nonce is reserved it stays consumed whatever happens next: a
//! failed dispatch is retried with a fresh nonce, never the same one. The
//! fee check runs inside the ledger commit, so an underpaid dispatch posts
//! nothing and emits nothing.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use treasury_types::{
    Address, Amount, BatchId, BatchMeta, DestinationId, EngineConfig, LedgerConfig, Nonce,
    OutboundMessage, PaymentIntent, PaymentState, Posting, Result, RouteConfig, SourceRef,
    TreasuryError,
};

use crate::{
    account_ledger::AccountLedger,
    fees::{FeeQuoter, RouteFeeSchedule},
    name_directory::NameDirectory,
    nonce_registry::NonceRegistry,
    price_gate::PriceGate,
};

/// Hands dispatched messages to the messaging layer.
pub trait MessageSink: Send + Sync {
    fn emit(&self, message: OutboundMessage);
}

/// In-memory FIFO of emitted messages, drained by the relay.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Mutex<VecDeque<OutboundMessage>>,
    emitted: AtomicU64,
}

impl Outbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued message, oldest first.
    pub fn drain(&self) -> Vec<OutboundMessage> {
        self.queue.lock().drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Messages ever emitted, drained or not.
    #[must_use]
    pub fn emitted_total(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl MessageSink for Outbox {
    fn emit(&self, message: OutboundMessage) {
        self.queue.lock().push_back(message);
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }
}

/// What a successful dispatch produced.
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    pub batch_id: BatchId,
    /// Price accepted by the gate, for gated routes.
    pub price: Option<Decimal>,
    pub fee_quoted: Amount,
    pub message: OutboundMessage,
}

pub struct PaymentDispatcher {
    ledger: Arc<AccountLedger>,
    nonces: Arc<NonceRegistry>,
    price_gate: Arc<PriceGate>,
    fees: Arc<dyn FeeQuoter>,
    sink: Arc<dyn MessageSink>,
    names: Option<Arc<dyn NameDirectory>>,
    routes: HashMap<DestinationId, RouteConfig>,
    treasury_account: Address,
    settlement_account: Address,
    /// Lifecycle of every payment that got past nonce reservation.
    payments: DashMap<(Address, Nonce), PaymentState>,
}

impl PaymentDispatcher {
    /// Wire a dispatcher over existing components. Fees default to the
    /// routes' own schedule.
    #[must_use]
    pub fn new(
        ledger: Arc<AccountLedger>,
        nonces: Arc<NonceRegistry>,
        price_gate: Arc<PriceGate>,
        sink: Arc<dyn MessageSink>,
        ledger_config: &LedgerConfig,
        routes: &[RouteConfig],
    ) -> Self {
        Self {
            ledger,
            nonces,
            price_gate,
            fees: Arc::new(RouteFeeSchedule::from_routes(routes)),
            sink,
            names: None,
            routes: routes.iter().map(|r| (r.destination, r.clone())).collect(),
            treasury_account: ledger_config.treasury_account,
            settlement_account: ledger_config.settlement_account,
            payments: DashMap::new(),
        }
    }

    /// Build the whole source side from configuration.
    ///
    /// # Errors
    /// Returns `Configuration` if the config is invalid.
    pub fn from_config(config: &EngineConfig, sink: Arc<dyn MessageSink>) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            Arc::new(AccountLedger::from_config(&config.ledger)),
            Arc::new(NonceRegistry::new()),
            Arc::new(PriceGate::from_config(&config.ledger)?),
            sink,
            &config.ledger,
            &config.routes,
        ))
    }

    #[must_use]
    pub fn with_fee_quoter(mut self, fees: Arc<dyn FeeQuoter>) -> Self {
        self.fees = fees;
        self
    }

    #[must_use]
    pub fn with_name_directory(mut self, names: Arc<dyn NameDirectory>) -> Self {
        self.names = Some(names);
        self
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<AccountLedger> {
        &self.ledger
    }

    #[must_use]
    pub fn nonces(&self) -> &Arc<NonceRegistry> {
        &self.nonces
    }

    #[must_use]
    pub fn price_gate(&self) -> &Arc<PriceGate> {
        &self.price_gate
    }

    #[must_use]
    pub fn route(&self, destination: DestinationId) -> Option<&RouteConfig> {
        self.routes.get(&destination)
    }

    /// Current messaging fee for a payment.
    ///
    /// # Errors
    /// Returns `UnknownRoute` for unconfigured destinations.
    pub fn quote_fee(&self, destination: DestinationId, recipient: Address, amount: Amount) -> Result<Amount> {
        self.fees.quote(destination, recipient, amount)
    }

    /// Dispatch a payment on behalf of `caller`.
    ///
    /// Input checks and authorization run before the nonce is touched;
    /// everything after reservation consumes the nonce even on failure.
    ///
    /// # Errors
    /// - `UnknownRoute`, `InvalidAmount`, `UnauthorizedDispatcher` (nonce untouched)
    /// - `NonceReused`
    /// - `AttestationRequired`, `InvalidAttestation`, `StalePrice`,
    ///   `PriceBelowThreshold`, `PaymentValueExceeded`
    /// - `InsufficientFunds`, `FeeInsufficient`
    pub fn dispatch(&self, caller: Address, intent: PaymentIntent) -> Result<DispatchReceipt> {
        let route = self
            .routes
            .get(&intent.destination)
            .ok_or(TreasuryError::UnknownRoute(intent.destination))?;
        if intent.amount == 0 {
            return Err(TreasuryError::InvalidAmount {
                reason: "payment amount must be positive".to_string(),
            });
        }
        self.ledger.ensure_dispatcher(caller)?;

        self.nonces.reserve(caller, intent.nonce)?;
        let key = (caller, intent.nonce);
        self.payments.insert(key, PaymentState::NonceReserved);

        match self.execute(caller, &intent, route) {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                self.advance(caller, intent.nonce, PaymentState::Failed);
                tracing::warn!(
                    owner = %caller,
                    nonce = %intent.nonce,
                    invoice = %intent.invoice_id.short(),
                    error = %e,
                    "Dispatch failed; nonce consumed"
                );
                Err(e)
            }
        }
    }

    /// Resolve `name` and dispatch to it. The intent's recipient is replaced.
    ///
    /// # Errors
    /// `NameNotFound` (nonce untouched), otherwise as [`PaymentDispatcher::dispatch`].
    pub fn dispatch_by_name(&self, caller: Address, name: &str, mut intent: PaymentIntent) -> Result<DispatchReceipt> {
        intent.recipient = self.resolve_name(name)?;
        tracing::debug!(name, recipient = %intent.recipient, "Payee resolved");
        self.dispatch(caller, intent)
    }

    /// Look up a payee in the name directory.
    ///
    /// # Errors
    /// `NameNotFound` if the name is unknown or no directory is configured.
    pub fn resolve_name(&self, name: &str) -> Result<Address> {
        self.names
            .as_ref()
            .and_then(|dir| dir.resolve(name))
            .ok_or_else(|| TreasuryError::NameNotFound(name.to_string()))
    }

    fn execute(&self, caller: Address, intent: &PaymentIntent, route: &RouteConfig) -> Result<DispatchReceipt> {
        let price = self.check_price(intent, route)?;
        if price.is_some() {
            self.advance(caller, intent.nonce, PaymentState::PriceValidated);
        }

        let postings = vec![
            Posting::debit(self.treasury_account, route.token.clone(), intent.amount),
            Posting::credit(self.settlement_account, route.token.clone(), intent.amount),
        ];
        let meta = BatchMeta::new(intent.intent.clone(), caller)
            .with_price(price)
            .with_invoice(intent.invoice_id);

        let mut fee_quoted = 0;
        let batch_id = self.ledger.post_batch_guarded(postings, meta, || {
            let required = self.fees.quote(intent.destination, intent.recipient, intent.amount)?;
            if intent.attached_fee < required {
                return Err(TreasuryError::FeeInsufficient {
                    attached: intent.attached_fee,
                    required,
                });
            }
            fee_quoted = required;
            Ok(())
        })?;
        self.advance(caller, intent.nonce, PaymentState::Posted);

        let message = OutboundMessage {
            source: SourceRef {
                ledger: self.ledger.ledger_id(),
                batch_id,
                owner: caller,
                nonce: intent.nonce,
            },
            destination: intent.destination,
            recipient: intent.recipient,
            token: route.token.clone(),
            amount: intent.amount,
            invoice_id: intent.invoice_id,
            intent: intent.intent.clone(),
            fee_quoted,
            created_at: Utc::now(),
        };
        self.sink.emit(message.clone());
        self.advance(caller, intent.nonce, PaymentState::Dispatched);

        tracing::info!(
            owner = %caller,
            nonce = %intent.nonce,
            batch = %batch_id,
            destination = %intent.destination,
            recipient = %intent.recipient,
            amount = intent.amount,
            invoice = %intent.invoice_id.short(),
            "Payment dispatched"
        );
        Ok(DispatchReceipt {
            batch_id,
            price,
            fee_quoted,
            message,
        })
    }

    fn check_price(&self, intent: &PaymentIntent, route: &RouteConfig) -> Result<Option<Decimal>> {
        let Some(gate) = &route.price_gate else {
            return Ok(None);
        };
        let attestation = intent
            .attestation
            .as_ref()
            .ok_or(TreasuryError::AttestationRequired(intent.destination))?;
        if attestation.feed_id != gate.feed_id {
            return Err(TreasuryError::InvalidAttestation {
                reason: format!("feed {} does not match route feed {}", attestation.feed_id, gate.feed_id),
            });
        }
        let price = self
            .price_gate
            .validate(attestation, gate.max_age_secs, gate.min_price)?;
        if let Some(max_value) = gate.max_payment_value {
            self.price_gate
                .check_payment_value(price, intent.amount, route.token_decimals, max_value)?;
        }
        Ok(Some(price))
    }

    // ---- Payment tracking ----

    #[must_use]
    pub fn payment_state(&self, owner: Address, nonce: Nonce) -> Option<PaymentState> {
        self.payments.get(&(owner, nonce)).map(|s| *s)
    }

    /// Move a tracked payment to `target` if the state machine allows it.
    /// Returns whether the state changed.
    pub fn advance(&self, owner: Address, nonce: Nonce, target: PaymentState) -> bool {
        let Some(mut state) = self.payments.get_mut(&(owner, nonce)) else {
            return false;
        };
        let from = *state;
        if from.can_transition_to(target) {
            tracing::debug!(owner = %owner, nonce = %nonce, from = %from, to = %target, "Payment state");
            *state = target;
            true
        } else {
            false
        }
    }

    /// Number of tracked payments currently in `state`.
    #[must_use]
    pub fn count_in_state(&self, state: PaymentState) -> usize {
        self.payments.iter().filter(|s| *s.value() == state).count()
    }
}
