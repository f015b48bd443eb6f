//! Signed oracle price attestations.
//!
//! An attestation is a pull-oracle price update: the caller fetches it from
//! the oracle collaborator and attaches it to a dispatch. It is never
//! persisted; only the accepted price survives, inside the batch metadata.
//!
//! The price is a fixed-point integer with a decimal exponent, e.g.
//! `price = 312_456_000_000, expo = -8` is `3124.56`.

use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::{Signer, SigningKey};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{FeedId, Result, TreasuryError, constants};

/// A signed, time-stamped price statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceAttestation {
    pub feed_id: FeedId,
    /// Fixed-point price mantissa.
    pub price: i64,
    /// Confidence interval, same exponent as `price`.
    pub confidence: u64,
    /// Decimal exponent applied to `price` and `confidence`.
    pub expo: i32,
    /// Publish time, seconds since the UNIX epoch.
    pub publish_time: i64,
    /// Ed25519 public key of the issuer.
    pub issuer: [u8; 32],
    /// Ed25519 signature over [`PriceAttestation::signing_payload`].
    pub signature: Vec<u8>,
}

impl PriceAttestation {
    /// Unsigned attestation; call [`PriceAttestation::sign_with`] before use.
    #[must_use]
    pub fn new(feed_id: FeedId, price: i64, confidence: u64, expo: i32, publish_time: i64) -> Self {
        Self {
            feed_id,
            price,
            confidence,
            expo,
            publish_time,
            issuer: [0u8; 32],
            signature: Vec::new(),
        }
    }

    /// Canonical signing payload.
    ///
    /// Format: `"treasury:attestation:v1:" || feed_id || price || confidence || expo || publish_time`
    /// (integers little-endian).
    #[must_use]
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(96);
        payload.extend_from_slice(constants::ATTESTATION_DOMAIN);
        payload.extend_from_slice(&self.feed_id.0);
        payload.extend_from_slice(&self.price.to_le_bytes());
        payload.extend_from_slice(&self.confidence.to_le_bytes());
        payload.extend_from_slice(&self.expo.to_le_bytes());
        payload.extend_from_slice(&self.publish_time.to_le_bytes());
        payload
    }

    /// Sign as `key`, recording its public key as the issuer.
    pub fn sign_with(&mut self, key: &SigningKey) {
        self.issuer = key.verifying_key().to_bytes();
        self.signature = key.sign(&self.signing_payload()).to_bytes().to_vec();
    }

    /// Builder form of [`PriceAttestation::sign_with`].
    #[must_use]
    pub fn signed(mut self, key: &SigningKey) -> Self {
        self.sign_with(key);
        self
    }

    /// The attested price as a decimal.
    ///
    /// # Errors
    /// Returns `InvalidAttestation` if the exponent is out of range.
    pub fn price_decimal(&self) -> Result<Decimal> {
        scale(i128::from(self.price), self.expo)
    }

    /// The confidence interval as a decimal.
    ///
    /// # Errors
    /// Returns `InvalidAttestation` if the exponent is out of range.
    pub fn confidence_decimal(&self) -> Result<Decimal> {
        scale(i128::from(self.confidence), self.expo)
    }

    /// Publish time as a timestamp, if representable.
    #[must_use]
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.publish_time, 0).single()
    }
}

fn scale(mantissa: i128, expo: i32) -> Result<Decimal> {
    let invalid = || TreasuryError::InvalidAttestation {
        reason: format!("cannot scale {mantissa} by 10^{expo}"),
    };
    if expo <= 0 {
        let scale = expo.unsigned_abs();
        Decimal::try_from_i128_with_scale(mantissa, scale).map_err(|_| invalid())
    } else {
        let factor = 10i128.checked_pow(expo.unsigned_abs()).ok_or_else(invalid)?;
        let value = mantissa.checked_mul(factor).ok_or_else(invalid)?;
        Decimal::try_from_i128_with_scale(value, 0).map_err(|_| invalid())
    }
}
