//! Price gate: hard check on signed oracle attestations before a payment
//! may touch the ledger.
//!
//! A gated dispatch carries a [`PriceAttestation`] fetched from the oracle.
//! The gate authenticates it, rejects it if stale or under the route's
//! minimum, and hands back the accepted price, which is then recorded in
//! the batch metadata.
//!
//! Fail-closed: any check that cannot be completed rejects the payment.

use std::collections::HashMap;

use chrono::Utc;
use ed25519_dalek::{Signature, VerifyingKey};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use treasury_types::{
    Amount, FeedId, LedgerConfig, PriceAttestation, Result, TreasuryError, constants,
};

/// Authenticates attestations. The engine only relies on this seam, so a
/// different oracle scheme plugs in without touching the gate.
pub trait AttestationVerifier: Send + Sync {
    /// # Errors
    /// Returns `InvalidAttestation` if the attestation is not authentic.
    fn verify(&self, attestation: &PriceAttestation) -> Result<()>;
}

/// Ed25519 verifier over a fixed set of trusted issuers.
#[derive(Debug, Clone)]
pub struct IssuerSet {
    issuers: Vec<VerifyingKey>,
}

impl IssuerSet {
    #[must_use]
    pub fn new(issuers: Vec<VerifyingKey>) -> Self {
        Self { issuers }
    }

    /// # Errors
    /// Returns `Configuration` if an issuer key is malformed.
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        Ok(Self::new(config.oracle_issuer_keys()?))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issuers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issuers.is_empty()
    }
}

impl AttestationVerifier for IssuerSet {
    fn verify(&self, attestation: &PriceAttestation) -> Result<()> {
        let invalid = |reason: String| TreasuryError::InvalidAttestation { reason };

        let issuer = self
            .issuers
            .iter()
            .find(|k| k.as_bytes() == &attestation.issuer)
            .ok_or_else(|| invalid(format!("untrusted issuer {}", hex::encode(attestation.issuer))))?;

        let signature = Signature::from_slice(&attestation.signature)
            .map_err(|e| invalid(format!("malformed signature: {e}")))?;

        issuer
            .verify_strict(&attestation.signing_payload(), &signature)
            .map_err(|e| invalid(format!("bad signature for feed {}: {e}", attestation.feed_id)))
    }
}

/// Last accepted observation for a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedPrice {
    pub price: Decimal,
    pub publish_time: i64,
}

/// Validates attestations and values gated payments.
pub struct PriceGate {
    verifier: Box<dyn AttestationVerifier>,
    /// Last accepted price per feed (diagnostics only; never used to
    /// accept a payment).
    last_prices: RwLock<HashMap<FeedId, ObservedPrice>>,
}

impl PriceGate {
    #[must_use]
    pub fn new(verifier: impl AttestationVerifier + 'static) -> Self {
        Self {
            verifier: Box::new(verifier),
            last_prices: RwLock::new(HashMap::new()),
        }
    }

    /// Build a gate trusting the issuers listed in the ledger config.
    ///
    /// # Errors
    /// Returns `Configuration` if an issuer key is malformed.
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        Ok(Self::new(IssuerSet::from_config(config)?))
    }

    /// Validate against the current wall clock. Returns the accepted price.
    ///
    /// # Errors
    /// See [`PriceGate::validate_at`].
    pub fn validate(
        &self,
        attestation: &PriceAttestation,
        max_age_secs: u64,
        min_threshold: Decimal,
    ) -> Result<Decimal> {
        self.validate_at(attestation, max_age_secs, min_threshold, Utc::now().timestamp())
    }

    /// Validate as of `now` (seconds since the epoch).
    ///
    /// Checks, in order: authenticity, clock skew, age, threshold.
    ///
    /// # Errors
    /// - `InvalidAttestation` for a bad signature, untrusted issuer, a
    ///   publish time too far in the future, or an unscalable exponent
    /// - `StalePrice` if `now - publish_time > max_age_secs`
    /// - `PriceBelowThreshold` if the price is under `min_threshold`
    pub fn validate_at(
        &self,
        attestation: &PriceAttestation,
        max_age_secs: u64,
        min_threshold: Decimal,
        now: i64,
    ) -> Result<Decimal> {
        self.verifier.verify(attestation)?;

        let skew = attestation.publish_time.saturating_sub(now);
        if skew > constants::MAX_ATTESTATION_CLOCK_SKEW_SECS {
            return Err(TreasuryError::InvalidAttestation {
                reason: format!("publish time {skew}s in the future"),
            });
        }
        // Within the skew tolerance a future timestamp counts as fresh.
        let age_secs = u64::try_from(now.saturating_sub(attestation.publish_time)).unwrap_or(0);
        if age_secs > max_age_secs {
            tracing::warn!(
                feed = %attestation.feed_id,
                age_secs,
                max_age_secs,
                "Stale attestation rejected"
            );
            return Err(TreasuryError::StalePrice {
                age_secs,
                max_age_secs,
            });
        }

        let price = attestation.price_decimal()?;
        if price < min_threshold {
            tracing::warn!(
                feed = %attestation.feed_id,
                price = %price,
                threshold = %min_threshold,
                "Price below threshold"
            );
            return Err(TreasuryError::PriceBelowThreshold {
                price,
                threshold: min_threshold,
            });
        }

        self.observe(attestation.feed_id, price, attestation.publish_time);
        tracing::debug!(feed = %attestation.feed_id, price = %price, age_secs, "Price accepted");
        Ok(price)
    }

    /// Value `amount` base units (with `decimals`) at `price` and reject it
    /// above `max_value`. Returns the computed value.
    ///
    /// # Errors
    /// - `PaymentValueExceeded` if the value is over the cap
    /// - `InvalidAmount` if the amount cannot be represented as a decimal
    pub fn check_payment_value(
        &self,
        price: Decimal,
        amount: Amount,
        decimals: u32,
        max_value: Decimal,
    ) -> Result<Decimal> {
        let value = payment_value(price, amount, decimals)?;
        if value > max_value {
            return Err(TreasuryError::PaymentValueExceeded {
                value,
                max: max_value,
            });
        }
        Ok(value)
    }

    /// Last accepted price for a feed, if any.
    #[must_use]
    pub fn last_price(&self, feed_id: &FeedId) -> Option<ObservedPrice> {
        self.last_prices.read().get(feed_id).copied()
    }

    fn observe(&self, feed_id: FeedId, price: Decimal, publish_time: i64) {
        let mut prices = self.last_prices.write();
        let newer = prices
            .get(&feed_id)
            .is_none_or(|seen| seen.publish_time <= publish_time);
        if newer {
            prices.insert(feed_id, ObservedPrice { price, publish_time });
        }
    }
}

/// `amount / 10^decimals * price`.
///
/// # Errors
/// Returns `InvalidAmount` if the amount or its scale overflows a decimal.
pub fn payment_value(price: Decimal, amount: Amount, decimals: u32) -> Result<Decimal> {
    let overflow = || TreasuryError::InvalidAmount {
        reason: format!("cannot value {amount} at {decimals} decimals"),
    };
    let units = i128::try_from(amount).map_err(|_| overflow())?;
    let quantity = Decimal::try_from_i128_with_scale(units, decimals).map_err(|_| overflow())?;
    quantity.checked_mul(price).ok_or_else(overflow)
}
