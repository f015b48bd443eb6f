//! # treasury-settlement
//!
//! Destination side of the treasury settlement engine.
//!
//! Messages arrive from the relay at least once, possibly duplicated and
//! out of order. This crate turns that into exactly-once settlement:
//!
//! - **[`ThresholdSignatureVerifier`]**: k-of-n verifier signatures over the message digest
//! - **[`InvoiceIndex`]**: invoice dedup, never evicted
//! - **[`SettlementVault`]**: pool of funds, atomic release + record + mark per invoice
//!
//! ## Delivery flow
//!
//! ```text
//! relay → verify proof → invoice processed? ─yes─▶ Duplicate (no-op)
//!                                 │ no
//!                                 ▼
//!                    pool covers amount? ─no─▶ InsufficientVaultBalance (retry later)
//!                                 │ yes
//!                                 ▼
//!              release + PaymentRecord + mark invoice ─▶ Executed { index }
//! ```

pub mod invoice_index;
pub mod proof;
pub mod vault;

pub use invoice_index::{InvoiceEntry, InvoiceIndex};
pub use proof::{ProofVerifier, ThresholdSignatureVerifier};
pub use vault::SettlementVault;
