//! Per-owner one-time nonce registry.
//!
//! Nonces are chosen by the caller (timestamp + random salt), not handed out
//! by a counter, so any number of payments from one owner can be in flight
//! at once and reach the registry in any order. The only rule is that an
//! (owner, nonce) pair is consumed once, forever.
//!
//! Reservation is a check-and-set on a single map entry. The map is sharded,
//! so reservations of unrelated pairs never contend on a global lock.

use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use treasury_types::{Address, Nonce, Result, TreasuryError};

/// Audit record of a consumed nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceRecord {
    pub owner: Address,
    pub nonce: Nonce,
    pub used: bool,
    pub reserved_at: DateTime<Utc>,
}

/// Tracks consumed (owner, nonce) pairs. Entries are never removed.
#[derive(Debug, Default)]
pub struct NonceRegistry {
    records: DashMap<(Address, Nonce), NonceRecord>,
}

impl NonceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically consume `(owner, nonce)`.
    ///
    /// # Errors
    /// Returns [`TreasuryError::NonceReused`] if the pair was consumed before,
    /// whether by a completed dispatch, a failed one, or a concurrent racer.
    pub fn reserve(&self, owner: Address, nonce: Nonce) -> Result<()> {
        match self.records.entry((owner, nonce)) {
            Entry::Occupied(_) => {
                tracing::warn!(owner = %owner, nonce = %nonce, "Nonce reuse rejected");
                Err(TreasuryError::NonceReused { owner, nonce })
            }
            Entry::Vacant(slot) => {
                slot.insert(NonceRecord {
                    owner,
                    nonce,
                    used: true,
                    reserved_at: Utc::now(),
                });
                tracing::debug!(owner = %owner, nonce = %nonce, "Nonce reserved");
                Ok(())
            }
        }
    }

    /// Whether `(owner, nonce)` has been consumed. Pure read.
    #[must_use]
    pub fn is_used(&self, owner: Address, nonce: Nonce) -> bool {
        self.records.contains_key(&(owner, nonce))
    }

    /// The audit record of a consumed nonce.
    #[must_use]
    pub fn record(&self, owner: Address, nonce: Nonce) -> Option<NonceRecord> {
        self.records.get(&(owner, nonce)).map(|r| r.value().clone())
    }

    /// Number of nonces consumed by `owner`.
    #[must_use]
    pub fn used_count(&self, owner: Address) -> usize {
        self.records.iter().filter(|r| r.key().0 == owner).count()
    }

    /// Total consumed nonces across all owners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Fresh caller-side nonce: `unix_millis * 1_000_000 + salt`, salt uniform in
/// `0..1_000_000`. Two payments generated in the same millisecond collide
/// with probability 1e-6; a collision surfaces as `NonceReused` and the
/// caller simply generates again.
#[must_use]
pub fn generate_nonce() -> Nonce {
    let millis = u128::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
    let salt: u128 = rand::thread_rng().gen_range(0..1_000_000);
    Nonce(millis * 1_000_000 + salt)
}
