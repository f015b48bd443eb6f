//! # treasury-ledger
//!
//! Source side of the treasury settlement engine.
//!
//! Every outgoing payment passes through this crate before any value moves:
//!
//! - **[`NonceRegistry`]**: one-time (owner, nonce) consumption, concurrent and order-free
//! - **[`PriceGate`]**: authenticates signed oracle attestations, rejects stale or low prices
//! - **[`AccountLedger`]**: double-entry batches, compensation, deposits/withdrawals, supply checks
//! - **[`PaymentDispatcher`]**: authorize → reserve nonce → gate price → post batch → emit message
//! - **[`RouteFeeSchedule`]**: per-destination messaging fee quotes
//! - **[`InMemoryNameDirectory`]**: payee name resolution for `dispatch_by_name`

pub mod account_ledger;
pub mod dispatcher;
pub mod fees;
pub mod name_directory;
pub mod nonce_registry;
pub mod price_gate;

pub use account_ledger::{AccountLedger, Authorization};
pub use dispatcher::{DispatchReceipt, MessageSink, Outbox, PaymentDispatcher};
pub use fees::{FeeQuoter, RouteFeeSchedule};
pub use name_directory::{InMemoryNameDirectory, NameDirectory};
pub use nonce_registry::{NonceRecord, NonceRegistry, generate_nonce};
pub use price_gate::{AttestationVerifier, IssuerSet, ObservedPrice, PriceGate, payment_value};
