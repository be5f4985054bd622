//! Kashi liquidator core logic.
//!
//! This crate provides the liquidation pass:
//! - Network and bot configuration
//! - Pair, borrower and liquidation-history discovery from explorer logs
//! - Solvency probing through simulated `liquidate` calls
//! - Rebase math and liquidation sizing
//! - Liquidation execution and pass reporting
//!
//! Chain access goes through `kashi_chain::KashiProtocol` and log access
//! through `kashi_api::LogSource`, one instance of each per network.

pub mod config;
mod discovery;
mod engine;
mod error;
mod executor;
mod pair;
pub mod rebase_math;
mod report;
mod sizer;
mod solvency;

#[cfg(test)]
mod testing;

pub use config::{load_networks, load_networks_from_env, BotConfig, Network, RateLimit};
pub use discovery::PairDiscovery;
pub use engine::LiquidationEngine;
pub use error::{EngineError, MathError};
pub use executor::{liquidation_percent, part_to_repay, LiquidationExecutor};
pub use pair::{HistoricalLiquidation, InsolventBorrower, Pair, PairSnapshot, TokenInfo};
pub use report::{AttemptOutcome, LiquidationAttempt, PairReport, PassReport, PassStatistics};
pub use sizer::{size_borrower, LiquidationSizer};
pub use solvency::{ProbeFailure, ProbeOutcome, ProbeSender, SentinelPolicy, SolvencyProbe};
