//! System-wide constants for the settlement engine.

/// Default maximum attestation age accepted by the price gate, in seconds.
pub const DEFAULT_MAX_PRICE_AGE_SECS: u64 = 60;

/// Attestations published this far in the future are rejected outright.
pub const MAX_ATTESTATION_CLOCK_SKEW_SECS: i64 = 30;

/// Basis-point denominator for fee schedules.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Default base messaging fee (0.00002 native units at 18 decimals).
pub const DEFAULT_BASE_FEE: u128 = 20_000_000_000_000;

/// Default retry attempts at the dispatch and delivery boundaries.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;

/// Default first back-off delay in milliseconds.
pub const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 200;

/// Default back-off ceiling in milliseconds.
pub const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 10_000;

/// Default back-off growth factor.
pub const DEFAULT_RETRY_MULTIPLIER: u32 = 2;

/// Domain separator for price attestation signatures.
pub const ATTESTATION_DOMAIN: &[u8] = b"treasury:attestation:v1:";

/// Domain separator for outbound message digests.
pub const MESSAGE_DOMAIN: &[u8] = b"treasury:message:v1:";

/// Domain separator for verifier signatures over a message digest.
pub const DELIVERY_PROOF_DOMAIN: &[u8] = b"treasury:delivery:v1:";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
