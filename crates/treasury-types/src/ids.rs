//! Identifiers used throughout the settlement engine.
//!
//! Batch identifiers use UUIDv7 for time-ordered sorting. Everything that
//! crosses the chain boundary (addresses, invoice ids, feed ids) is a fixed
//! width byte array rendered as `0x`-prefixed hex.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, TreasuryError};

/// Decode a `0x`-prefixed (or bare) hex string into a fixed-width array.
///
/// # Errors
/// Returns [`TreasuryError::Serialization`] on bad hex or wrong width.
pub fn decode_hex_array<const N: usize>(s: &str) -> Result<[u8; N]> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw)
        .map_err(|e| TreasuryError::Serialization(format!("invalid hex {s:?}: {e}")))?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        TreasuryError::Serialization(format!("expected {N} bytes, got {} in {s:?}", v.len()))
    })
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account identity on either side of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Self = Self([0u8; 20]);

    #[must_use]
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// First four bytes as hex, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = TreasuryError;

    fn from_str(s: &str) -> Result<Self> {
        decode_hex_array(s).map(Self)
    }
}

impl TryFrom<String> for Address {
    type Error = TreasuryError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_string()
    }
}

// ---------------------------------------------------------------------------
// InvoiceId
// ---------------------------------------------------------------------------

/// 32-byte invoice hash: the idempotency key on the destination side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvoiceId(pub [u8; 32]);

impl InvoiceId {
    /// Derive the invoice hash from a human-readable invoice label
    /// (e.g. `INV-1731240000000`).
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        use sha2::{Digest, Sha256};
        Self(Sha256::digest(label.as_bytes()).into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for InvoiceId {
    type Err = TreasuryError;

    fn from_str(s: &str) -> Result<Self> {
        decode_hex_array(s).map(Self)
    }
}

impl TryFrom<String> for InvoiceId {
    type Error = TreasuryError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<InvoiceId> for String {
    fn from(id: InvoiceId) -> Self {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// FeedId
// ---------------------------------------------------------------------------

/// Oracle price feed identifier (e.g. the ETH/USD feed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeedId(pub [u8; 32]);

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for FeedId {
    type Err = TreasuryError;

    fn from_str(s: &str) -> Result<Self> {
        decode_hex_array(s).map(Self)
    }
}

impl TryFrom<String> for FeedId {
    type Error = TreasuryError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<FeedId> for String {
    fn from(id: FeedId) -> Self {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// Nonce
// ---------------------------------------------------------------------------

/// Caller-chosen one-time token. Not a sequence number: any unused value is
/// valid, in any order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Nonce(pub u128);

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BatchId
// ---------------------------------------------------------------------------

/// Identifier of a committed ledger batch. UUIDv7, so ids sort by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// DestinationId / LedgerId
// ---------------------------------------------------------------------------

/// Messaging-layer endpoint id of the destination chain (e.g. 40245).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DestinationId(pub u32);

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dst:{}", self.0)
    }
}

/// Endpoint id of a source ledger. Vaults only accept messages from ledgers
/// they are configured to trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LedgerId(pub u32);

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ledger:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "test-helpers"))]
impl Address {
    /// Random address for tests.
    pub fn random() -> Self {
        Self(rand::random())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl InvoiceId {
    /// Random invoice id for tests.
    pub fn random() -> Self {
        Self(rand::random())
    }
}
