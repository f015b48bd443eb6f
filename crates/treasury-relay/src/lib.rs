//! # treasury-relay
//!
//! Everything around the two ledgers that a live deployment gets from the
//! outside world, in-process:
//!
//! - **[`RetryPolicy`]**: bounded exponential back-off for dispatch and delivery
//! - **[`OracleSource`]** / **[`InMemoryOracle`]**: signed pull-oracle prices
//! - **[`VerifierCommittee`]**: quorum-signed delivery proofs
//! - **[`MessageRelay`]**: at-least-once delivery with duplication and reordering
//! - **[`PaymentAgent`]**: the authorized dispatcher's retrying client
//! - **[`Simulation`]**: full scenario used by the `treasury-sim` binary
//! - **[`logging`]**: `tracing-subscriber` setup

pub mod agent;
pub mod committee;
pub mod logging;
pub mod oracle;
pub mod relay;
pub mod retry;
pub mod simulation;

pub use agent::{PaymentAgent, PaymentRequest};
pub use committee::VerifierCommittee;
pub use oracle::{InMemoryOracle, OracleSource};
pub use relay::{MessageRelay, RelayOptions, RelayReport};
pub use retry::RetryPolicy;
pub use simulation::{Simulation, SimulationParams, SimulationReport};
