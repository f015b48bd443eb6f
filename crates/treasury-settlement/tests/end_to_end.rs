//! End-to-end tests across both sides of the bridge.
//!
//! Source ledger (dispatch) → outbox → signed delivery → settlement vault.
//!
//! They check the cross-component guarantees: each invoice pays out at most
//! once however often it is delivered, a short vault stalls instead of
//! losing the payment, and supply is conserved on both sides.

use std::sync::Arc;

use chrono::Utc;
use ed25519_dalek::{Signer, SigningKey};
use rust_decimal::Decimal;
use treasury_ledger::{AccountLedger, Authorization, IssuerSet, NonceRegistry, Outbox, PaymentDispatcher, PriceGate};
use treasury_settlement::{SettlementVault, ThresholdSignatureVerifier};
use treasury_types::*;

const SOURCE: LedgerId = LedgerId(40161);
const DEST: DestinationId = DestinationId(40245);
const FEE: Amount = 10;

/// Both sides of the bridge plus the keys that drive them.
struct Bridge {
    dispatcher: PaymentDispatcher,
    outbox: Arc<Outbox>,
    vault: SettlementVault,
    verifiers: Vec<SigningKey>,
    oracle: SigningKey,
    agent: Address,
    treasury: Address,
    settlement: Address,
}

impl Bridge {
    fn new(treasury_funds: Amount, vault_funds: Amount) -> Self {
        let oracle = SigningKey::from_bytes(&[40; 32]);
        let verifiers: Vec<SigningKey> = (41..=43u8).map(|i| SigningKey::from_bytes(&[i; 32])).collect();
        let owner = Address::random();
        let agent = Address::random();
        let treasury = Address::random();
        let settlement = Address::random();

        let ledger_config = LedgerConfig {
            ledger_id: SOURCE,
            owner,
            authorized_dispatcher: agent,
            treasury_account: treasury,
            settlement_account: settlement,
            oracle_issuers: vec![],
        };
        let route = RouteConfig {
            destination: DEST,
            token: "ETH".into(),
            token_decimals: 0,
            base_fee: FEE,
            fee_bps: 0,
            price_gate: Some(PriceGateConfig {
                feed_id: FeedId([7; 32]),
                max_age_secs: 60,
                min_price: Decimal::new(2000, 0),
                max_payment_value: None,
            }),
        };

        let ledger = Arc::new(AccountLedger::new(
            SOURCE,
            Authorization {
                owner,
                authorized_dispatcher: agent,
            },
        ));
        ledger.deposit(treasury, "ETH", treasury_funds).unwrap();

        let outbox = Arc::new(Outbox::new());
        let dispatcher = PaymentDispatcher::new(
            ledger,
            Arc::new(NonceRegistry::new()),
            Arc::new(PriceGate::new(IssuerSet::new(vec![oracle.verifying_key()]))),
            outbox.clone(),
            &ledger_config,
            &[route],
        );

        let vault = SettlementVault::new(
            ThresholdSignatureVerifier::new(
                verifiers.iter().map(SigningKey::verifying_key).collect(),
                2,
                [SOURCE],
            )
            .unwrap(),
        )
        .for_destination(DEST);
        if vault_funds > 0 {
            vault.top_up("ETH", vault_funds).unwrap();
        }

        Self {
            dispatcher,
            outbox,
            vault,
            verifiers,
            oracle,
            agent,
            treasury,
            settlement,
        }
    }

    fn attestation(&self, age_secs: i64) -> PriceAttestation {
        PriceAttestation::new(FeedId([7; 32]), 300_000, 0, -2, Utc::now().timestamp() - age_secs)
            .signed(&self.oracle)
    }

    fn intent(&self, nonce: u128, invoice: &str, amount: Amount) -> PaymentIntent {
        PaymentIntent {
            destination: DEST,
            recipient: Address([0xBB; 20]),
            amount,
            invoice_id: InvoiceId::from_label(invoice),
            intent: format!("Invoice {invoice}"),
            nonce: Nonce(nonce),
            attestation: Some(self.attestation(1)),
            attached_fee: FEE,
        }
    }

    fn prove(&self, message: &OutboundMessage) -> DeliveryProof {
        let digest = message.digest();
        let bytes = DeliveryProof::signing_bytes(&digest);
        DeliveryProof {
            message_digest: digest,
            signatures: self.verifiers[..2]
                .iter()
                .map(|k| VerifierSignature {
                    verifier: k.verifying_key().to_bytes(),
                    signature: k.sign(&bytes).to_bytes().to_vec(),
                })
                .collect(),
        }
    }

    fn source_balance(&self, account: Address) -> Amount {
        self.dispatcher.ledger().get_balance(account, "ETH")
    }
}

#[test]
fn dispatch_and_deliver_one_payment() {
    let bridge = Bridge::new(1_000, 1_000);
    bridge
        .dispatcher
        .dispatch(bridge.agent, bridge.intent(1, "INV-001", 100))
        .unwrap();
    assert_eq!(bridge.source_balance(bridge.treasury), 900);
    assert_eq!(bridge.source_balance(bridge.settlement), 100);

    let messages = bridge.outbox.drain();
    assert_eq!(messages.len(), 1);
    let outcome = bridge.vault.deliver(&messages[0], &bridge.prove(&messages[0])).unwrap();

    assert_eq!(outcome, DeliveryOutcome::Executed { index: 0 });
    assert_eq!(bridge.vault.vault_balance("ETH"), 900);
    assert_eq!(bridge.vault.payment_count(), 1);
    let record = bridge.vault.payment_history(0).unwrap();
    assert_eq!(record.amount, 100);
    assert_eq!(record.source.nonce, Nonce(1));
    assert_eq!(record.source.batch_id, messages[0].source.batch_id);

    bridge.dispatcher.ledger().verify_supply().unwrap();
    bridge.vault.verify_supply().unwrap();
}

#[test]
fn redelivery_pays_once() {
    let bridge = Bridge::new(1_000, 1_000);
    bridge
        .dispatcher
        .dispatch(bridge.agent, bridge.intent(1, "INV-001", 100))
        .unwrap();
    let message = bridge.outbox.drain().remove(0);
    let proof = bridge.prove(&message);

    let outcomes: Vec<DeliveryOutcome> = (0..4)
        .map(|_| bridge.vault.deliver(&message, &proof).unwrap())
        .collect();
    assert_eq!(outcomes[0], DeliveryOutcome::Executed { index: 0 });
    assert!(outcomes[1..].iter().all(|o| *o == DeliveryOutcome::Duplicate));
    assert_eq!(bridge.vault.vault_balance("ETH"), 900);
    assert_eq!(bridge.vault.paid_to(message.recipient, "ETH"), 100);
}

#[test]
fn duplicate_invoice_from_source_settles_once() {
    let bridge = Bridge::new(1_000, 1_000);
    // The source side does not dedup invoices: both dispatches post.
    bridge
        .dispatcher
        .dispatch(bridge.agent, bridge.intent(1, "INV-DUP", 100))
        .unwrap();
    bridge
        .dispatcher
        .dispatch(bridge.agent, bridge.intent(2, "INV-DUP", 100))
        .unwrap();
    assert_eq!(bridge.source_balance(bridge.treasury), 800);

    let messages = bridge.outbox.drain();
    let outcomes: Vec<DeliveryOutcome> = messages
        .iter()
        .map(|m| bridge.vault.deliver(m, &bridge.prove(m)).unwrap())
        .collect();
    assert_eq!(
        outcomes,
        vec![DeliveryOutcome::Executed { index: 0 }, DeliveryOutcome::Duplicate]
    );
    assert_eq!(bridge.vault.payment_count(), 1);
}

#[test]
fn short_vault_stalls_then_recovers_after_top_up() {
    let bridge = Bridge::new(1_000, 50);
    bridge
        .dispatcher
        .dispatch(bridge.agent, bridge.intent(1, "INV-STALL", 100))
        .unwrap();
    let message = bridge.outbox.drain().remove(0);
    let proof = bridge.prove(&message);

    let err = bridge.vault.deliver(&message, &proof).unwrap_err();
    assert!(matches!(err, TreasuryError::InsufficientVaultBalance { .. }));
    assert!(!bridge.vault.is_processed(&message.invoice_id));

    bridge.vault.top_up("ETH", 150).unwrap();
    assert_eq!(bridge.vault.vault_balance("ETH"), 200);
    assert_eq!(
        bridge.vault.deliver(&message, &proof).unwrap(),
        DeliveryOutcome::Executed { index: 0 }
    );
    assert_eq!(bridge.vault.vault_balance("ETH"), 100);
    bridge.vault.verify_supply().unwrap();
}

#[test]
fn stale_price_posts_nothing_and_emits_nothing() {
    let bridge = Bridge::new(1_000, 1_000);
    let mut intent = bridge.intent(1, "INV-STALE", 100);
    intent.attestation = Some(bridge.attestation(600));

    let err = bridge.dispatcher.dispatch(bridge.agent, intent).unwrap_err();
    assert!(matches!(err, TreasuryError::StalePrice { .. }));
    assert_eq!(bridge.dispatcher.ledger().batch_count(), 0);
    assert_eq!(bridge.source_balance(bridge.treasury), 1_000);
    assert!(bridge.outbox.is_empty());
}

#[test]
fn forged_delivery_is_rejected_and_genuine_one_still_settles() {
    let bridge = Bridge::new(1_000, 1_000);
    bridge
        .dispatcher
        .dispatch(bridge.agent, bridge.intent(1, "INV-F", 100))
        .unwrap();
    let message = bridge.outbox.drain().remove(0);

    let mut forged = message.clone();
    forged.recipient = Address([0xEE; 20]);
    let err = bridge
        .vault
        .deliver(&forged, &bridge.prove(&message))
        .unwrap_err();
    assert!(matches!(err, TreasuryError::InvalidProof { .. }));

    let outcome = bridge.vault.deliver(&message, &bridge.prove(&message)).unwrap();
    assert_eq!(outcome, DeliveryOutcome::Executed { index: 0 });
    assert_eq!(bridge.vault.paid_to(Address([0xEE; 20]), "ETH"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_payments_deliver_in_any_order() {
    let bridge = Arc::new(Bridge::new(1_000, 1_000));

    let mut handles = Vec::new();
    for n in 0..5u128 {
        let bridge = Arc::clone(&bridge);
        handles.push(tokio::spawn(async move {
            let intent = bridge.intent(1_000 + n, &format!("INV-C{n}"), 20);
            bridge.dispatcher.dispatch(bridge.agent, intent)
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let batches = bridge.dispatcher.ledger().batches();
    assert_eq!(batches.len(), 5);
    assert!(batches.iter().all(Batch::is_balanced));
    assert_eq!(bridge.dispatcher.nonces().used_count(bridge.agent), 5);

    let mut messages = bridge.outbox.drain();
    messages.reverse();
    for message in &messages {
        bridge.vault.deliver(message, &bridge.prove(message)).unwrap();
    }
    assert_eq!(bridge.vault.payment_count(), 5);
    assert_eq!(bridge.vault.vault_balance("ETH"), 900);
    bridge.dispatcher.ledger().verify_supply().unwrap();
    bridge.vault.verify_supply().unwrap();
}
