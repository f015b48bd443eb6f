//! Messaging fee quotes.
//!
//! A route's fee is `base_fee + amount * fee_bps / 10_000`. Quotes are
//! recomputed at dispatch time, so a quote obtained earlier is advisory.

use std::collections::HashMap;

use treasury_types::{Address, Amount, DestinationId, Result, RouteConfig, TreasuryError, checked_add, constants};

/// Quotes the messaging fee for a payment.
pub trait FeeQuoter: Send + Sync {
    /// # Errors
    /// Returns `UnknownRoute` for unconfigured destinations.
    fn quote(&self, destination: DestinationId, recipient: Address, amount: Amount) -> Result<Amount>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FeeTerms {
    base_fee: Amount,
    fee_bps: u32,
}

/// Static per-route fee schedule.
#[derive(Debug, Clone, Default)]
pub struct RouteFeeSchedule {
    terms: HashMap<DestinationId, FeeTerms>,
}

impl RouteFeeSchedule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_routes(routes: &[RouteConfig]) -> Self {
        let mut schedule = Self::new();
        for route in routes {
            schedule.set(route.destination, route.base_fee, route.fee_bps);
        }
        schedule
    }

    pub fn set(&mut self, destination: DestinationId, base_fee: Amount, fee_bps: u32) {
        self.terms.insert(destination, FeeTerms { base_fee, fee_bps });
    }
}

impl FeeQuoter for RouteFeeSchedule {
    fn quote(&self, destination: DestinationId, _recipient: Address, amount: Amount) -> Result<Amount> {
        let terms = self
            .terms
            .get(&destination)
            .ok_or(TreasuryError::UnknownRoute(destination))?;
        let bps = Amount::from(terms.fee_bps);
        // Divide first when the product would overflow; loses < 1 unit.
        let proportional = amount.checked_mul(bps).map_or_else(
            || amount / constants::BPS_DENOMINATOR * bps,
            |p| p / constants::BPS_DENOMINATOR,
        );
        checked_add(terms.base_fee, proportional)
    }
}
