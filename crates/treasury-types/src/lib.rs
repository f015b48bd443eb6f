//! # treasury-types
//!
//! Shared types, errors, and configuration for the cross-chain treasury
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`Address`], [`InvoiceId`], [`Nonce`], [`BatchId`], [`FeedId`], [`DestinationId`], [`LedgerId`]
//! - **Ledger model**: [`Posting`], [`PostingSide`], [`Batch`], [`BatchMeta`], [`BalanceEntry`], [`Amount`], [`Token`]
//! - **Oracle model**: [`PriceAttestation`]
//! - **Messaging model**: [`OutboundMessage`], [`SourceRef`], [`DeliveryProof`], [`VerifierSignature`]
//! - **Payment model**: [`PaymentIntent`], [`PaymentState`], [`PaymentRecord`], [`DeliveryOutcome`]
//! - **Safety**: [`SupplyConservation`]
//! - **Configuration**: [`EngineConfig`], [`LedgerConfig`], [`RouteConfig`], [`VaultConfig`], [`RetryConfig`]
//! - **Errors**: [`TreasuryError`] with `TR_ERR_` prefix codes and [`ErrorCategory`]
//! - **Constants**: system-wide defaults and signature domains

pub mod attestation;
pub mod balance;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod message;
pub mod payment;
pub mod posting;
pub mod supply;

pub use attestation::*;
pub use balance::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use message::*;
pub use payment::*;
pub use posting::*;
pub use supply::*;

// Constants are accessed via `treasury_types::constants::FOO`
// (not re-exported to avoid name collisions).
