//! Pull-oracle collaborator.
//!
//! The agent fetches a fresh signed attestation before every gated
//! dispatch attempt. [`InMemoryOracle`] signs prices on demand and can be
//! told to lag, which is how the simulator produces stale prices.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use ed25519_dalek::{SigningKey, VerifyingKey};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use treasury_types::{FeedId, PriceAttestation, Result, TreasuryError};

/// Source of signed price attestations.
#[async_trait]
pub trait OracleSource: Send + Sync {
    /// Latest attestation for `feed_id`.
    async fn fetch(&self, feed_id: FeedId) -> Result<PriceAttestation>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Quote {
    price: i64,
    confidence: u64,
    expo: i32,
}

/// Signs whatever price it was last told, stamped `now - lag`.
pub struct InMemoryOracle {
    key: SigningKey,
    quotes: RwLock<HashMap<FeedId, Quote>>,
    lag_secs: AtomicI64,
}

impl InMemoryOracle {
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        Self {
            key,
            quotes: RwLock::new(HashMap::new()),
            lag_secs: AtomicI64::new(0),
        }
    }

    #[must_use]
    pub fn generate() -> Self {
        Self::new(SigningKey::generate(&mut OsRng))
    }

    #[must_use]
    pub fn issuer(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn set_price(&self, feed_id: FeedId, price: i64, confidence: u64, expo: i32) {
        self.quotes.write().insert(
            feed_id,
            Quote {
                price,
                confidence,
                expo,
            },
        );
    }

    /// Publish attestations `secs` in the past from now on.
    pub fn set_lag(&self, secs: i64) {
        self.lag_secs.store(secs, Ordering::Relaxed);
    }
}

#[async_trait]
impl OracleSource for InMemoryOracle {
    async fn fetch(&self, feed_id: FeedId) -> Result<PriceAttestation> {
        let quote = self
            .quotes
            .read()
            .get(&feed_id)
            .copied()
            .ok_or_else(|| TreasuryError::InvalidAttestation {
                reason: format!("no price published for feed {feed_id}"),
            })?;
        let publish_time = Utc::now().timestamp() - self.lag_secs.load(Ordering::Relaxed);
        Ok(
            PriceAttestation::new(feed_id, quote.price, quote.confidence, quote.expo, publish_time)
                .signed(&self.key),
        )
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[tokio::test]
    async fn fetch_returns_signed_current_price() {
        let oracle = InMemoryOracle::generate();
        let feed = FeedId([3; 32]);
        oracle.set_price(feed, 312_456, 10, -2);

        let att = oracle.fetch(feed).await.unwrap();
        assert_eq!(att.price_decimal().unwrap(), Decimal::new(312_456, 2));
        assert_eq!(att.issuer, oracle.issuer().to_bytes());
        assert!((Utc::now().timestamp() - att.publish_time).abs() <= 1);
    }

    #[tokio::test]
    async fn lag_backdates_attestations() {
        let oracle = InMemoryOracle::generate();
        let feed = FeedId([3; 32]);
        oracle.set_price(feed, 1, 0, 0);
        oracle.set_lag(600);
        let att = oracle.fetch(feed).await.unwrap();
        assert!(Utc::now().timestamp() - att.publish_time >= 600);
    }

    #[tokio::test]
    async fn unknown_feed_is_an_error() {
        let oracle = InMemoryOracle::generate();
        let err = oracle.fetch(FeedId([9; 32])).await.unwrap_err();
        assert!(matches!(err, TreasuryError::InvalidAttestation { .. }));
    }
}
