//! Payment intents, the payment state machine and settlement records.
//!
//! ## State Machine
//!
//! ```text
//!   Created ─▶ NonceReserved ─▶ PriceValidated ─▶ Posted ─▶ Dispatched ─▶ Delivered
//!                   │                 │  (optional)    │           │  ▲
//!                   └─────────────────┴────────────────┴─▶ Failed  ▼  │ relay retry
//!                                                               Stalled
//! ```
//!
//! `Delivered` and `Failed` are terminal. `Stalled` means the vault could not
//! cover the payment yet; it is left by a later successful delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Address, Amount, DestinationId, InvoiceId, Nonce, PriceAttestation, SourceRef, Token};

/// What a caller submits to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub destination: DestinationId,
    pub recipient: Address,
    pub amount: Amount,
    pub invoice_id: InvoiceId,
    pub intent: String,
    pub nonce: Nonce,
    pub attestation: Option<PriceAttestation>,
    /// Messaging fee the caller attaches (must cover the current quote).
    pub attached_fee: Amount,
}

/// Lifecycle of one payment, keyed by its (owner, nonce).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentState {
    Created,
    NonceReserved,
    PriceValidated,
    Posted,
    Dispatched,
    Delivered,
    Stalled,
    Failed,
}

impl PaymentState {
    /// Can this payment move to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        use PaymentState::{
            Created, Delivered, Dispatched, Failed, NonceReserved, Posted, PriceValidated, Stalled,
        };
        matches!(
            (self, target),
            (Created, NonceReserved | Failed)
                | (NonceReserved, PriceValidated | Posted | Failed)
                | (PriceValidated, Posted | Failed)
                | (Posted, Dispatched | Failed)
                | (Dispatched | Stalled, Delivered | Stalled)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::NonceReserved => "NONCE_RESERVED",
            Self::PriceValidated => "PRICE_VALIDATED",
            Self::Posted => "POSTED",
            Self::Dispatched => "DISPATCHED",
            Self::Delivered => "DELIVERED",
            Self::Stalled => "STALLED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Settlement history entry written by the vault, at most once per invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub recipient: Address,
    pub token: Token,
    pub amount: Amount,
    pub invoice_id: InvoiceId,
    pub intent: String,
    pub source: SourceRef,
    /// When the source side created the message.
    pub timestamp: DateTime<Utc>,
    /// When the vault released the funds.
    pub executed_at: DateTime<Utc>,
}

/// Result of a successful `deliver` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Funds released; the record sits at this history index.
    Executed { index: u64 },
    /// The invoice was already settled; nothing changed.
    Duplicate,
}
