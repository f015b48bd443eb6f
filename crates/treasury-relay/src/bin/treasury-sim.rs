//! # treasury-sim
//!
//! Runs the parallel-dispatch scenario end to end and prints a JSON report
//! on stdout. Logs go to stderr.
//!
//! - `run`: dispatch, relay, optionally top up and redeliver
//! - `config`: print a generated engine configuration

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use treasury_relay::{
    Simulation, SimulationParams,
    logging::{self, LogFormat},
};
use treasury_types::{RetryConfig, constants};

/// Cross-chain treasury settlement simulator.
#[derive(Parser, Debug)]
#[command(name = "treasury-sim", version, propagate_version = true)]
struct Cli {
    /// Log output format: pretty or json.
    #[arg(long, global = true, env = "TREASURY_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scenario.
    Run(RunArgs),
    /// Print the engine configuration a run would use.
    Config(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Payments dispatched concurrently.
    #[arg(long, short = 'n', default_value_t = 5)]
    payments: usize,

    /// Amount per payment, in base units.
    #[arg(long, default_value_t = 100)]
    amount: u128,

    /// Initial treasury balance on the source ledger.
    #[arg(long, default_value_t = 1_000)]
    treasury_funds: u128,

    /// Initial vault balance on the destination.
    #[arg(long, default_value_t = 1_000)]
    vault_funds: u128,

    /// Vault top-up applied if deliveries stall.
    #[arg(long, default_value_t = 0)]
    top_up: u128,

    /// Probability that the relay delivers a message twice.
    #[arg(long, default_value_t = 0.3, value_parser = parse_rate)]
    duplicate_rate: f64,

    /// Deliver in dispatch order instead of shuffling.
    #[arg(long)]
    in_order: bool,

    /// Oracle price in cents.
    #[arg(long, default_value_t = 312_456)]
    price_cents: i64,

    /// Minimum accepted price.
    #[arg(long, default_value = "2000")]
    min_price: Decimal,

    /// Seconds the oracle backdates its prices (simulates staleness).
    #[arg(long, default_value_t = 0)]
    oracle_lag: i64,

    /// Verifier committee size.
    #[arg(long, default_value_t = 3)]
    verifiers: usize,

    /// Signatures required per delivery proof.
    #[arg(long, default_value_t = 2)]
    quorum: usize,

    /// Attempts per dispatch and per delivery.
    #[arg(long, env = "TREASURY_RETRY_ATTEMPTS", default_value_t = 3)]
    retry_attempts: u32,

    /// Initial back-off between attempts, in milliseconds.
    #[arg(long, default_value_t = 10)]
    retry_backoff_ms: u64,
}

impl RunArgs {
    fn params(&self) -> SimulationParams {
        SimulationParams {
            payments: self.payments,
            amount: self.amount,
            treasury_funds: self.treasury_funds,
            vault_funds: self.vault_funds,
            top_up: self.top_up,
            duplicate_rate: self.duplicate_rate,
            reorder: !self.in_order,
            price_cents: self.price_cents,
            min_price: self.min_price,
            oracle_lag_secs: self.oracle_lag,
            verifiers: self.verifiers,
            quorum: self.quorum,
            retry: RetryConfig {
                max_attempts: self.retry_attempts,
                initial_backoff_ms: self.retry_backoff_ms,
                max_backoff_ms: self
                    .retry_backoff_ms
                    .max(constants::DEFAULT_RETRY_MAX_BACKOFF_MS),
                multiplier: constants::DEFAULT_RETRY_MULTIPLIER,
            },
        }
    }
}

fn parse_rate(raw: &str) -> Result<f64, String> {
    let rate: f64 = raw.parse().map_err(|e| format!("{raw}: {e}"))?;
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(format!("{raw} is not a probability between 0 and 1"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);

    match cli.command {
        Commands::Run(args) => {
            let simulation = Simulation::build(args.params()).context("failed to build simulation")?;
            tracing::info!(
                payments = args.payments,
                amount = args.amount,
                version = constants::VERSION,
                "starting treasury-sim"
            );
            let report = simulation.run().await.context("simulation failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.supply_conserved {
                anyhow::bail!("supply conservation violated");
            }
        }
        Commands::Config(args) => {
            let simulation = Simulation::build(args.params()).context("failed to build simulation")?;
            println!("{}", serde_json::to_string_pretty(simulation.config())?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_args_map_to_params() {
        let cli = Cli::parse_from(["treasury-sim", "run", "-n", "7", "--top-up", "500", "--in-order"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let params = args.params();
        assert_eq!(params.payments, 7);
        assert_eq!(params.top_up, 500);
        assert!(!params.reorder);
        assert_eq!(params.min_price, Decimal::new(2000, 0));
    }

    #[test]
    fn duplicate_rate_must_be_a_probability() {
        for bad in ["NaN", "inf", "-0.1", "1.5", "often"] {
            let parsed = Cli::try_parse_from(["treasury-sim", "run", "--duplicate-rate", bad]);
            assert!(parsed.is_err(), "{bad} accepted");
        }
        let cli = Cli::try_parse_from(["treasury-sim", "run", "--duplicate-rate", "1"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!((args.duplicate_rate - 1.0).abs() < f64::EPSILON);
    }
}
