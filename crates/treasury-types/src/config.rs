//! Configuration types for the source ledger, its routes and the vault.
//!
//! Configuration is plain JSON so deployments can keep it next to their
//! contract addresses. Keys are hex-encoded ed25519 public keys.

use std::{collections::HashSet, path::Path};

use ed25519_dalek::VerifyingKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Address, Amount, DestinationId, FeedId, LedgerId, Result, Token, TreasuryError, constants,
    decode_hex_array,
};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub ledger: LedgerConfig,
    pub routes: Vec<RouteConfig>,
    pub vault: VaultConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Source-side ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Endpoint id of this ledger on the messaging layer.
    pub ledger_id: LedgerId,
    /// Owner role: the only identity allowed to change the dispatcher.
    pub owner: Address,
    /// Initial authorized dispatcher (the agent wallet).
    pub authorized_dispatcher: Address,
    /// Account debited by dispatches.
    pub treasury_account: Address,
    /// Account holding funds that are in flight to a destination.
    pub settlement_account: Address,
    /// Hex ed25519 keys of trusted oracle issuers.
    #[serde(default)]
    pub oracle_issuers: Vec<String>,
}

impl LedgerConfig {
    /// Decode the trusted oracle issuer keys.
    ///
    /// # Errors
    /// Returns `Configuration` if any key is not a valid ed25519 point.
    pub fn oracle_issuer_keys(&self) -> Result<Vec<VerifyingKey>> {
        self.oracle_issuers.iter().map(|k| parse_verifying_key(k)).collect()
    }
}

/// One destination route: fee schedule, settled token, optional price gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub destination: DestinationId,
    pub token: Token,
    /// Token decimals, used to value payments against the oracle price.
    pub token_decimals: u32,
    /// Flat messaging fee per message.
    pub base_fee: Amount,
    /// Proportional fee in basis points of the amount.
    #[serde(default)]
    pub fee_bps: u32,
    #[serde(default)]
    pub price_gate: Option<PriceGateConfig>,
}

/// Oracle gating for a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceGateConfig {
    pub feed_id: FeedId,
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
    /// Minimum acceptable price.
    pub min_price: Decimal,
    /// Optional cap on `amount × price`.
    #[serde(default)]
    pub max_payment_value: Option<Decimal>,
}

fn default_max_age() -> u64 {
    constants::DEFAULT_MAX_PRICE_AGE_SECS
}

/// Destination-side vault configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Hex ed25519 keys of the messaging-layer verifier set.
    pub verifiers: Vec<String>,
    /// Distinct verifier signatures required per message.
    pub threshold: usize,
    /// Source ledgers whose messages this vault settles.
    pub accepted_sources: Vec<LedgerId>,
    /// Endpoint id of this vault; messages addressed elsewhere are refused.
    #[serde(default)]
    pub destination: Option<DestinationId>,
}

impl VaultConfig {
    /// Decode the verifier keys.
    ///
    /// # Errors
    /// Returns `Configuration` if any key is not a valid ed25519 point.
    pub fn verifier_keys(&self) -> Result<Vec<VerifyingKey>> {
        self.verifiers.iter().map(|k| parse_verifying_key(k)).collect()
    }
}

/// Retry policy parameters shared by the dispatch and delivery boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_RETRY_MAX_ATTEMPTS,
            initial_backoff_ms: constants::DEFAULT_RETRY_INITIAL_BACKOFF_MS,
            max_backoff_ms: constants::DEFAULT_RETRY_MAX_BACKOFF_MS,
            multiplier: constants::DEFAULT_RETRY_MULTIPLIER,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    /// `Serialization` for malformed JSON, `Configuration` for invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    ///
    /// # Errors
    /// `Io` if the file cannot be read, otherwise as [`EngineConfig::from_json_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Look up the route for a destination.
    #[must_use]
    pub fn route(&self, destination: DestinationId) -> Option<&RouteConfig> {
        self.routes.iter().find(|r| r.destination == destination)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns `Configuration` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let cfg_err = |msg: String| Err(TreasuryError::Configuration(msg));

        if self.ledger.treasury_account == self.ledger.settlement_account {
            return cfg_err("treasury and settlement accounts must differ".into());
        }
        self.ledger.oracle_issuer_keys()?;

        let mut seen = HashSet::new();
        for route in &self.routes {
            if !seen.insert(route.destination) {
                return cfg_err(format!("duplicate route for {}", route.destination));
            }
            if route.token.is_empty() {
                return cfg_err(format!("route {} has an empty token", route.destination));
            }
            if u128::from(route.fee_bps) > constants::BPS_DENOMINATOR {
                return cfg_err(format!(
                    "route {} fee_bps {} exceeds {}",
                    route.destination,
                    route.fee_bps,
                    constants::BPS_DENOMINATOR
                ));
            }
            if let Some(gate) = &route.price_gate {
                if gate.min_price.is_sign_negative() {
                    return cfg_err(format!("route {} has a negative min_price", route.destination));
                }
                if self.ledger.oracle_issuers.is_empty() {
                    return cfg_err(format!(
                        "route {} is price-gated but no oracle issuers are configured",
                        route.destination
                    ));
                }
            }
        }

        let verifiers = self.vault.verifier_keys()?;
        if self.vault.threshold == 0 || self.vault.threshold > verifiers.len() {
            return cfg_err(format!(
                "vault threshold {} must be between 1 and {}",
                self.vault.threshold,
                verifiers.len()
            ));
        }
        if self.vault.accepted_sources.is_empty() {
            return cfg_err("vault accepts no source ledgers".into());
        }

        if self.retry.max_attempts == 0 {
            return cfg_err("retry.max_attempts must be at least 1".into());
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return cfg_err("retry.initial_backoff_ms exceeds retry.max_backoff_ms".into());
        }
        Ok(())
    }
}

/// Parse a hex ed25519 public key.
///
/// # Errors
/// Returns `Configuration` for bad hex or an invalid curve point.
pub fn parse_verifying_key(hex_key: &str) -> Result<VerifyingKey> {
    let bytes: [u8; 32] = decode_hex_array(hex_key)
        .map_err(|e| TreasuryError::Configuration(format!("bad public key: {e}")))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| TreasuryError::Configuration(format!("invalid ed25519 key {hex_key}: {e}")))
}
