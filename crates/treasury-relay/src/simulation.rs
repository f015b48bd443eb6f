//! End-to-end simulation: one source ledger, one vault, a lossy relay and a
//! payment agent firing payments in parallel.
//!
//! Keys for the oracle and the verifier committee are generated per run;
//! only their public halves end up in the [`EngineConfig`].

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use treasury_ledger::{InMemoryNameDirectory, Outbox, PaymentDispatcher};
use treasury_settlement::SettlementVault;
use treasury_types::{
    Address, Amount, DestinationId, EngineConfig, FeedId, InvoiceId, LedgerConfig, LedgerId,
    PaymentState, PriceGateConfig, Result, RetryConfig, RouteConfig, constants,
};

use crate::{
    agent::{PaymentAgent, PaymentRequest},
    committee::VerifierCommittee,
    oracle::InMemoryOracle,
    relay::{MessageRelay, RelayOptions, RelayReport},
    retry::RetryPolicy,
};

pub const SOURCE_LEDGER: LedgerId = LedgerId(40161);
pub const DESTINATION: DestinationId = DestinationId(40245);
pub const TOKEN: &str = "ETH";

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParams {
    pub payments: usize,
    pub amount: Amount,
    pub treasury_funds: Amount,
    pub vault_funds: Amount,
    /// Added to the vault after the first pump if anything stalled.
    pub top_up: Amount,
    pub duplicate_rate: f64,
    pub reorder: bool,
    /// Oracle price in cents.
    pub price_cents: i64,
    pub min_price: Decimal,
    /// How far in the past the oracle stamps its prices.
    pub oracle_lag_secs: i64,
    pub verifiers: usize,
    pub quorum: usize,
    pub retry: RetryConfig,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            payments: 5,
            amount: 100,
            treasury_funds: 1_000,
            vault_funds: 1_000,
            top_up: 0,
            duplicate_rate: 0.3,
            reorder: true,
            price_cents: 312_456,
            min_price: Decimal::new(2000, 0),
            oracle_lag_secs: 0,
            verifiers: 3,
            quorum: 2,
            retry: RetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 10,
                max_backoff_ms: 100,
                multiplier: 2,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub dispatched: usize,
    pub dispatch_failures: Vec<String>,
    pub first_pump: RelayReport,
    pub redelivery: Option<RelayReport>,
    pub treasury_balance: Amount,
    pub settlement_balance: Amount,
    pub vault_balance: Amount,
    pub payment_count: u64,
    pub delivered: usize,
    pub stalled: usize,
    pub supply_conserved: bool,
}

pub struct Simulation {
    params: SimulationParams,
    config: EngineConfig,
    names: Arc<InMemoryNameDirectory>,
    dispatcher: Arc<PaymentDispatcher>,
    vault: Arc<SettlementVault>,
    relay: MessageRelay,
    agent: PaymentAgent,
}

impl Simulation {
    /// Generate keys, derive the configuration and wire both sides.
    ///
    /// # Errors
    /// `Configuration` if the parameters produce an invalid configuration,
    /// `InvalidAmount` for zero or overflowing funding.
    pub fn build(params: SimulationParams) -> Result<Self> {
        let oracle = Arc::new(InMemoryOracle::generate());
        let feed = FeedId(rand::random());
        oracle.set_price(feed, params.price_cents, 0, -2);
        oracle.set_lag(params.oracle_lag_secs);

        let committee = Arc::new(VerifierCommittee::generate(params.verifiers, params.quorum)?);
        let agent_identity = random_address();
        let treasury = random_address();

        let mut vault_config = committee.vault_config(vec![SOURCE_LEDGER]);
        vault_config.destination = Some(DESTINATION);
        let config = EngineConfig {
            ledger: LedgerConfig {
                ledger_id: SOURCE_LEDGER,
                owner: random_address(),
                authorized_dispatcher: agent_identity,
                treasury_account: treasury,
                settlement_account: random_address(),
                oracle_issuers: vec![hex::encode(oracle.issuer().to_bytes())],
            },
            routes: vec![RouteConfig {
                destination: DESTINATION,
                token: TOKEN.to_string(),
                token_decimals: 18,
                base_fee: constants::DEFAULT_BASE_FEE,
                fee_bps: 0,
                price_gate: Some(PriceGateConfig {
                    feed_id: feed,
                    max_age_secs: constants::DEFAULT_MAX_PRICE_AGE_SECS,
                    min_price: params.min_price,
                    max_payment_value: None,
                }),
            }],
            vault: vault_config,
            retry: params.retry,
        };

        let outbox = Arc::new(Outbox::new());
        let names = Arc::new(InMemoryNameDirectory::new());
        let dispatcher = Arc::new(
            PaymentDispatcher::from_config(&config, outbox.clone())?.with_name_directory(names.clone()),
        );
        dispatcher
            .ledger()
            .deposit(treasury, TOKEN, params.treasury_funds)?;

        let vault = Arc::new(SettlementVault::from_config(&config.vault)?);
        if params.vault_funds > 0 {
            vault.top_up(TOKEN, params.vault_funds)?;
        }

        let retry = RetryPolicy::from_config(&config.retry);
        let options = RelayOptions::new(params.duplicate_rate, params.reorder)?;
        let relay = MessageRelay::new(outbox, committee, Arc::clone(&vault), Arc::clone(&dispatcher), retry)
            .with_options(options);
        let agent = PaymentAgent::new(agent_identity, Arc::clone(&dispatcher), oracle, retry);

        Ok(Self {
            params,
            config,
            names,
            dispatcher,
            vault,
            relay,
            agent,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Payee names the agent can pay by.
    #[must_use]
    pub fn names(&self) -> &Arc<InMemoryNameDirectory> {
        &self.names
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<PaymentDispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn vault(&self) -> &Arc<SettlementVault> {
        &self.vault
    }

    #[must_use]
    pub fn agent(&self) -> &PaymentAgent {
        &self.agent
    }

    #[must_use]
    pub fn relay(&self) -> &MessageRelay {
        &self.relay
    }

    /// Dispatch, relay, top up if needed, redeliver, then report.
    ///
    /// # Errors
    /// `InvalidAmount` if the top-up overflows.
    pub async fn run(&self) -> Result<SimulationReport> {
        let requests: Vec<PaymentRequest> = (0..self.params.payments)
            .map(|i| PaymentRequest {
                destination: DESTINATION,
                recipient: random_address(),
                amount: self.params.amount,
                invoice_id: InvoiceId::from_label(&format!("SIM-INV-{i:04}")),
                intent: format!("Simulated invoice {i}"),
            })
            .collect();

        let results = self.agent.pay_all(requests).await;
        let dispatched = results.iter().filter(|r| r.is_ok()).count();
        let dispatch_failures: Vec<String> = results
            .iter()
            .filter_map(|r| r.as_ref().err().map(ToString::to_string))
            .collect();
        tracing::info!(dispatched, failed = dispatch_failures.len(), "Dispatch phase finished");

        let first_pump = self.relay.pump().await;

        let redelivery = if self.relay.stalled_count() > 0 && self.params.top_up > 0 {
            self.vault.top_up(TOKEN, self.params.top_up)?;
            Some(self.relay.redeliver_stalled().await)
        } else {
            None
        };

        let ledger = self.dispatcher.ledger();
        let supply_conserved = ledger.verify_supply().is_ok() && self.vault.verify_supply().is_ok();

        Ok(SimulationReport {
            dispatched,
            dispatch_failures,
            first_pump,
            redelivery,
            treasury_balance: ledger.get_balance(self.config.ledger.treasury_account, TOKEN),
            settlement_balance: ledger.get_balance(self.config.ledger.settlement_account, TOKEN),
            vault_balance: self.vault.vault_balance(TOKEN),
            payment_count: self.vault.payment_count(),
            delivered: self.dispatcher.count_in_state(PaymentState::Delivered),
            stalled: self.relay.stalled_count(),
            supply_conserved,
        })
    }
}

fn random_address() -> Address {
    Address::from_bytes(rand::random())
}
