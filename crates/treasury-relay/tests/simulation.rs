//! Full scenarios through the relay crate: agent, dispatcher, lossy relay,
//! committee proofs and vault.

use std::sync::Arc;

use rust_decimal::Decimal;
use treasury_ledger::{FeeQuoter, Outbox, PaymentDispatcher};
use treasury_relay::{
    InMemoryOracle, PaymentAgent, PaymentRequest, RetryPolicy, Simulation, SimulationParams,
    simulation::{DESTINATION, TOKEN},
};
use treasury_types::{Address, Amount, DestinationId, InvoiceId, PaymentState, Result, TreasuryError};

fn quiet(params: SimulationParams) -> SimulationParams {
    SimulationParams {
        duplicate_rate: 0.0,
        ..params
    }
}

fn request(label: &str, amount: u128) -> PaymentRequest {
    PaymentRequest {
        destination: DESTINATION,
        recipient: Address::random(),
        amount,
        invoice_id: InvoiceId::from_label(label),
        intent: format!("pay {label}"),
    }
}

// ---- Happy path ----

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn default_run_delivers_everything_once() {
    let sim = Simulation::build(SimulationParams::default()).unwrap();
    let report = sim.run().await.unwrap();

    assert_eq!(report.dispatched, 5);
    assert!(report.dispatch_failures.is_empty());
    assert_eq!(report.first_pump.executed, 5);
    assert_eq!(report.first_pump.deliveries, 5 + report.first_pump.duplicates);
    assert_eq!(report.first_pump.rejected, 0);
    assert_eq!(report.treasury_balance, 500);
    assert_eq!(report.settlement_balance, 500);
    assert_eq!(report.vault_balance, 500);
    assert_eq!(report.payment_count, 5);
    assert_eq!(report.delivered, 5);
    assert_eq!(report.stalled, 0);
    assert!(report.redelivery.is_none());
    assert!(report.supply_conserved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_message_duplicated_still_pays_once() {
    let sim = Simulation::build(SimulationParams {
        duplicate_rate: 1.0,
        ..SimulationParams::default()
    })
    .unwrap();
    let report = sim.run().await.unwrap();

    assert_eq!(report.first_pump.deliveries, 10);
    assert_eq!(report.first_pump.executed, 5);
    assert_eq!(report.first_pump.duplicates, 5);
    assert_eq!(report.vault_balance, 500);
    assert_eq!(report.payment_count, 5);
}

// ---- Vault shortfall ----

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn short_vault_executes_what_fits_and_parks_the_rest() {
    let sim = Simulation::build(quiet(SimulationParams {
        vault_funds: 250,
        ..SimulationParams::default()
    }))
    .unwrap();
    let report = sim.run().await.unwrap();

    assert_eq!(report.first_pump.executed, 2);
    assert_eq!(report.first_pump.stalled, 3);
    assert_eq!(report.stalled, 3);
    assert_eq!(report.vault_balance, 50);
    assert_eq!(report.delivered, 2);
    assert_eq!(sim.dispatcher().count_in_state(PaymentState::Stalled), 3);
    // Source side is already debited for all five.
    assert_eq!(report.treasury_balance, 500);
    assert!(report.supply_conserved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn top_up_releases_stalled_payments() {
    let sim = Simulation::build(quiet(SimulationParams {
        vault_funds: 50,
        top_up: 1_000,
        ..SimulationParams::default()
    }))
    .unwrap();
    let report = sim.run().await.unwrap();

    assert_eq!(report.first_pump.executed, 0);
    assert_eq!(report.first_pump.stalled, 5);
    let redelivery = report.redelivery.expect("stalled payments should be redelivered");
    assert_eq!(redelivery.deliveries, 5);
    assert_eq!(redelivery.executed, 5);
    assert_eq!(report.stalled, 0);
    assert_eq!(report.delivered, 5);
    assert_eq!(report.vault_balance, 550);
    assert!(report.supply_conserved);
}

// ---- Price gate ----

#[tokio::test]
async fn lagging_oracle_blocks_every_dispatch() {
    let sim = Simulation::build(SimulationParams {
        oracle_lag_secs: 600,
        ..SimulationParams::default()
    })
    .unwrap();
    let report = sim.run().await.unwrap();

    assert_eq!(report.dispatched, 0);
    assert_eq!(report.dispatch_failures.len(), 5);
    assert_eq!(report.first_pump.deliveries, 0);
    assert_eq!(report.treasury_balance, 1_000);
    assert_eq!(report.settlement_balance, 0);
    assert_eq!(report.vault_balance, 1_000);
    assert_eq!(sim.dispatcher().ledger().batch_count(), 0);
    assert!(report.supply_conserved);
}

#[tokio::test]
async fn price_under_threshold_is_not_retried() {
    let sim = Simulation::build(SimulationParams {
        price_cents: 150_000,
        min_price: Decimal::new(2000, 0),
        ..SimulationParams::default()
    })
    .unwrap();
    let err = sim.agent().pay(&request("LOW-1", 100)).await.unwrap_err();
    assert!(matches!(err, TreasuryError::PriceBelowThreshold { .. }));
    // One attempt, one nonce.
    assert_eq!(sim.dispatcher().nonces().len(), 1);
}

// ---- Agent ----

#[tokio::test]
async fn agent_pays_and_relay_settles_single_request() {
    let sim = Simulation::build(quiet(SimulationParams::default())).unwrap();
    let req = request("ONE-1", 250);
    let receipt = sim.agent().pay(&req).await.unwrap();
    assert_eq!(receipt.message.amount, 250);
    assert_eq!(receipt.message.recipient, req.recipient);
    assert!(receipt.price.is_some());

    let pumped = sim.relay().pump().await;
    assert_eq!(pumped.executed, 1);
    assert_eq!(sim.vault().paid_to(req.recipient, TOKEN), 250);
    assert!(sim.vault().is_processed(&req.invoice_id));
    assert_eq!(
        sim.dispatcher()
            .payment_state(receipt.message.source.owner, receipt.message.source.nonce),
        Some(PaymentState::Delivered)
    );
}

#[tokio::test]
async fn agent_fails_fast_on_insufficient_treasury() {
    let sim = Simulation::build(SimulationParams::default()).unwrap();
    let err = sim.agent().pay(&request("BIG-1", 5_000)).await.unwrap_err();
    assert!(matches!(err, TreasuryError::InsufficientFunds { .. }));
    assert_eq!(sim.dispatcher().ledger().batch_count(), 0);
}

#[tokio::test]
async fn unknown_payee_name_is_reported() {
    let sim = Simulation::build(SimulationParams::default()).unwrap();
    let err = sim
        .agent()
        .pay_by_name("nobody.eth", &request("NAME-1", 10))
        .await
        .unwrap_err();
    assert!(matches!(err, TreasuryError::NameNotFound(_)));
    assert_eq!(sim.dispatcher().nonces().len(), 0);
}

#[tokio::test]
async fn pay_by_name_settles_to_the_registered_payee() {
    let sim = Simulation::build(quiet(SimulationParams::default())).unwrap();
    let vendor = Address::random();
    sim.names().register("acme.cloud", vendor);

    let receipt = sim
        .agent()
        .pay_by_name("ACME.cloud", &request("NAME-2", 120))
        .await
        .unwrap();
    assert_eq!(receipt.message.recipient, vendor);

    assert_eq!(sim.relay().pump().await.executed, 1);
    assert_eq!(sim.vault().paid_to(vendor, TOKEN), 120);
}

/// Charges a premium for one recipient; everyone else pays the floor.
struct RecipientPricedFees {
    premium_payee: Address,
}

impl FeeQuoter for RecipientPricedFees {
    fn quote(&self, destination: DestinationId, recipient: Address, _amount: Amount) -> Result<Amount> {
        if destination != DESTINATION {
            return Err(TreasuryError::UnknownRoute(destination));
        }
        Ok(if recipient == self.premium_payee { 500 } else { 1 })
    }
}

#[tokio::test]
async fn pay_by_name_quotes_the_fee_for_the_resolved_payee() {
    let sim = Simulation::build(SimulationParams::default()).unwrap();
    let mut config = sim.config().clone();
    for route in &mut config.routes {
        route.price_gate = None;
    }
    let vendor = Address::random();
    let names = Arc::new(treasury_ledger::InMemoryNameDirectory::new());
    names.register("premium", vendor);
    let dispatcher = PaymentDispatcher::from_config(&config, Arc::new(Outbox::new()))
        .unwrap()
        .with_fee_quoter(Arc::new(RecipientPricedFees { premium_payee: vendor }))
        .with_name_directory(names);
    dispatcher
        .ledger()
        .deposit(config.ledger.treasury_account, TOKEN, 1_000)
        .unwrap();
    let agent = PaymentAgent::new(
        config.ledger.authorized_dispatcher,
        Arc::new(dispatcher),
        Arc::new(InMemoryOracle::generate()),
        RetryPolicy::no_retry(),
    );

    let receipt = agent.pay_by_name("premium", &request("FEE-1", 10)).await.unwrap();
    assert_eq!(receipt.message.recipient, vendor);
    assert_eq!(receipt.fee_quoted, 500);
}

// ---- Shared invoices ----

#[tokio::test]
async fn second_payment_for_a_settled_invoice_is_not_marked_delivered() {
    let sim = Simulation::build(quiet(SimulationParams::default())).unwrap();
    let first = request("SHARED-1", 100);
    let second = PaymentRequest {
        recipient: Address::random(),
        ..first.clone()
    };
    let a = sim.agent().pay(&first).await.unwrap();
    let b = sim.agent().pay(&second).await.unwrap();

    let report = sim.relay().pump().await;
    assert_eq!(report.deliveries, 2);
    assert_eq!(report.executed, 1);
    assert_eq!(report.superseded, 1);
    assert_eq!(report.duplicates, 0);

    let dispatcher = sim.dispatcher();
    assert_eq!(dispatcher.count_in_state(PaymentState::Delivered), 1);
    assert_eq!(dispatcher.count_in_state(PaymentState::Dispatched), 1);
    let winner = sim.vault().settled_by(&first.invoice_id).unwrap();
    let loser = if winner == a.message.source { b.message.source } else { a.message.source };
    assert_eq!(
        dispatcher.payment_state(loser.owner, loser.nonce),
        Some(PaymentState::Dispatched)
    );
    assert_eq!(sim.vault().payment_count(), 1);
    assert_eq!(
        dispatcher
            .ledger()
            .get_balance(sim.config().ledger.treasury_account, TOKEN),
        800
    );
}

#[tokio::test]
async fn redelivering_the_settled_payment_still_counts_as_delivered() {
    let sim = Simulation::build(SimulationParams {
        duplicate_rate: 1.0,
        ..SimulationParams::default()
    })
    .unwrap();
    let receipt = sim.agent().pay(&request("TWICE-1", 100)).await.unwrap();

    let report = sim.relay().pump().await;
    assert_eq!(report.executed, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.superseded, 0);
    let source = receipt.message.source;
    assert_eq!(
        sim.dispatcher().payment_state(source.owner, source.nonce),
        Some(PaymentState::Delivered)
    );
}

#[test]
fn non_finite_duplicate_rate_is_rejected() {
    for rate in [f64::NAN, f64::INFINITY, -0.5, 2.0] {
        let err = Simulation::build(SimulationParams {
            duplicate_rate: rate,
            ..SimulationParams::default()
        })
        .err()
        .expect("invalid rate accepted");
        assert!(matches!(err, TreasuryError::Configuration(_)));
    }
}
