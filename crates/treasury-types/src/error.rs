//! Error types for the treasury settlement engine.
//!
//! All errors use the `TR_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors
//! - 2xx: Authorization errors
//! - 3xx: Nonce errors
//! - 4xx: Price / oracle errors
//! - 5xx: Funding errors
//! - 6xx: Messaging / settlement errors
//! - 7xx: Safety invariant errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{Address, Amount, BatchId, DestinationId, InvoiceId, Nonce};

/// The error taxonomy callers reason about. Every [`TreasuryError`] maps onto
/// exactly one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Validation,
    Authorization,
    Nonce,
    Price,
    Funding,
    Duplicate,
    Messaging,
    Internal,
}

/// Central error enum for all settlement operations.
#[derive(Debug, Error)]
pub enum TreasuryError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// Debits and credits of a batch differ for some token.
    #[error("TR_ERR_100: Unbalanced batch for {token}: debits {debits} != credits {credits}")]
    UnbalancedBatch {
        token: String,
        debits: Amount,
        credits: Amount,
    },

    /// Zero amounts, empty batches, arithmetic overflow.
    #[error("TR_ERR_101: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// No route is configured for this destination.
    #[error("TR_ERR_102: Unknown route: {0}")]
    UnknownRoute(DestinationId),

    /// The referenced batch was never committed.
    #[error("TR_ERR_103: Unknown batch: {0}")]
    UnknownBatch(BatchId),

    /// The batch already has a compensating batch.
    #[error("TR_ERR_104: Batch already compensated: {0}")]
    AlreadyCompensated(BatchId),

    /// A payee name did not resolve to an address.
    #[error("TR_ERR_105: Name not found: {0}")]
    NameNotFound(String),

    // =================================================================
    // Authorization Errors (2xx)
    // =================================================================
    /// The caller is not the currently authorized dispatcher.
    #[error("TR_ERR_200: Unauthorized dispatcher: {caller}")]
    UnauthorizedDispatcher { caller: Address },

    /// Only the owner may change the authorization settings.
    #[error("TR_ERR_201: Caller {caller} is not the owner")]
    NotOwner { caller: Address },

    // =================================================================
    // Nonce Errors (3xx)
    // =================================================================
    /// The (owner, nonce) pair has already been consumed.
    #[error("TR_ERR_300: Nonce {nonce} already used by {owner}")]
    NonceReused { owner: Address, nonce: Nonce },

    // =================================================================
    // Price Errors (4xx)
    // =================================================================
    /// The attestation is older than the allowed window.
    #[error("TR_ERR_400: Stale price: age {age_secs}s exceeds max {max_age_secs}s")]
    StalePrice { age_secs: u64, max_age_secs: u64 },

    /// The attested price is under the route's minimum.
    #[error("TR_ERR_401: Price {price} below threshold {threshold}")]
    PriceBelowThreshold { price: Decimal, threshold: Decimal },

    /// Signature, issuer or encoding of the attestation is not acceptable.
    #[error("TR_ERR_402: Invalid attestation: {reason}")]
    InvalidAttestation { reason: String },

    /// Notional value of the payment exceeds the route cap.
    #[error("TR_ERR_403: Payment value {value} exceeds maximum {max}")]
    PaymentValueExceeded { value: Decimal, max: Decimal },

    /// The route requires a price attestation but none was attached.
    #[error("TR_ERR_404: Price attestation required for {0}")]
    AttestationRequired(DestinationId),

    // =================================================================
    // Funding Errors (5xx)
    // =================================================================
    /// A debit would make an account balance negative.
    #[error("TR_ERR_500: Insufficient funds in {account} for {token}: need {needed}, have {available}")]
    InsufficientFunds {
        account: Address,
        token: String,
        needed: Amount,
        available: Amount,
    },

    /// The vault cannot cover the payment yet. Retryable after a top-up.
    #[error("TR_ERR_501: Insufficient vault balance for {token}: need {needed}, have {available}")]
    InsufficientVaultBalance {
        token: String,
        needed: Amount,
        available: Amount,
    },

    /// The attached messaging fee is below the current quote.
    #[error("TR_ERR_502: Fee insufficient: attached {attached}, required {required}")]
    FeeInsufficient { attached: Amount, required: Amount },

    // =================================================================
    // Messaging / Settlement Errors (6xx)
    // =================================================================
    /// The delivery proof did not authenticate the message.
    #[error("TR_ERR_600: Invalid delivery proof: {reason}")]
    InvalidProof { reason: String },

    /// The invoice was already settled. Delivery turns this into a no-op.
    #[error("TR_ERR_601: Invoice already processed: {0}")]
    InvoiceAlreadyProcessed(InvoiceId),

    /// No payment record at this history index.
    #[error("TR_ERR_602: Payment record not found at index {0}")]
    PaymentNotFound(u64),

    // =================================================================
    // Safety Errors (7xx)
    // =================================================================
    /// Supply conservation invariant violated. Critical.
    #[error("TR_ERR_700: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("TR_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("TR_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("TR_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("TR_ERR_903: I/O error: {0}")]
    Io(String),
}

impl TreasuryError {
    /// Taxonomy bucket of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnbalancedBatch { .. }
            | Self::InvalidAmount { .. }
            | Self::UnknownRoute(_)
            | Self::UnknownBatch(_)
            | Self::AlreadyCompensated(_)
            | Self::NameNotFound(_) => ErrorCategory::Validation,
            Self::UnauthorizedDispatcher { .. } | Self::NotOwner { .. } => {
                ErrorCategory::Authorization
            }
            Self::NonceReused { .. } => ErrorCategory::Nonce,
            Self::StalePrice { .. }
            | Self::PriceBelowThreshold { .. }
            | Self::InvalidAttestation { .. }
            | Self::PaymentValueExceeded { .. }
            | Self::AttestationRequired(_) => ErrorCategory::Price,
            Self::InsufficientFunds { .. }
            | Self::InsufficientVaultBalance { .. }
            | Self::FeeInsufficient { .. } => ErrorCategory::Funding,
            Self::InvoiceAlreadyProcessed(_) => ErrorCategory::Duplicate,
            Self::InvalidProof { .. } | Self::PaymentNotFound(_) => ErrorCategory::Messaging,
            Self::SupplyInvariantViolation { .. }
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Io(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a later attempt can succeed without operator action.
    ///
    /// A stale price or an outdated fee quote clears up once the caller
    /// fetches fresh data; an underfunded vault clears up after a top-up.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StalePrice { .. }
                | Self::FeeInsufficient { .. }
                | Self::InsufficientVaultBalance { .. }
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, TreasuryError>;

impl From<std::io::Error> for TreasuryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TreasuryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = TreasuryError::NonceReused {
            owner: Address::ZERO,
            nonce: Nonce(7),
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("TR_ERR_300"), "Got: {msg}");
        assert!(msg.contains('7'));
    }

    #[test]
    fn insufficient_funds_display() {
        let err = TreasuryError::InsufficientFunds {
            account: Address::ZERO,
            token: "ETH".into(),
            needed: 100,
            available: 50,
        };
        let msg = format!("{err}");
        assert!(msg.contains("TR_ERR_500"));
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn categories_follow_taxonomy() {
        assert_eq!(
            TreasuryError::UnbalancedBatch {
                token: "ETH".into(),
                debits: 1,
                credits: 2
            }
            .category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            TreasuryError::InvalidProof { reason: "x".into() }.category(),
            ErrorCategory::Messaging
        );
        assert_eq!(
            TreasuryError::InvoiceAlreadyProcessed(InvoiceId([0; 32])).category(),
            ErrorCategory::Duplicate
        );
        assert_eq!(
            TreasuryError::FeeInsufficient {
                attached: 1,
                required: 2
            }
            .category(),
            ErrorCategory::Funding
        );
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(
            TreasuryError::InsufficientVaultBalance {
                token: "ETH".into(),
                needed: 100,
                available: 50
            }
            .is_retryable()
        );
        assert!(
            TreasuryError::StalePrice {
                age_secs: 600,
                max_age_secs: 60
            }
            .is_retryable()
        );
        assert!(!TreasuryError::InvalidProof { reason: "x".into() }.is_retryable());
        assert!(
            !TreasuryError::NonceReused {
                owner: Address::ZERO,
                nonce: Nonce(1)
            }
            .is_retryable()
        );
    }

    #[test]
    fn all_errors_have_tr_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(TreasuryError::UnknownRoute(DestinationId(1))),
            Box::new(TreasuryError::PaymentNotFound(3)),
            Box::new(TreasuryError::Internal("test".into())),
            Box::new(TreasuryError::NotOwner {
                caller: Address::ZERO,
            }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("TR_ERR_"),
                "Error missing TR_ERR_ prefix: {msg}"
            );
        }
    }
}
