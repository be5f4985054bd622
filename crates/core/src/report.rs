//! Structured results of a liquidation pass.

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use kashi_chain::BlockRef;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::pair::{HistoricalLiquidation, InsolventBorrower, Pair, TokenInfo};
use crate::solvency::ProbeFailure;

/// What happened to one liquidation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// `confirmed` is false when the receipt had not arrived yet.
    Submitted { tx_hash: B256, confirmed: bool },
    Skipped { reason: String },
    Failed { error: String },
}

/// One borrower's liquidation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidationAttempt {
    pub borrower: Address,
    /// Share of the borrow part targeted, if any
    pub percent: Option<u64>,
    /// Borrow part passed to `liquidate`
    pub part: U256,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl LiquidationAttempt {
    pub fn skipped(borrower: Address, percent: Option<u64>, reason: String) -> Self {
        Self {
            borrower,
            percent,
            part: U256::ZERO,
            outcome: AttemptOutcome::Skipped { reason },
        }
    }
}

/// Result for one pair.
#[derive(Debug, Clone, Serialize)]
pub struct PairReport {
    pub address: Address,
    pub name: String,
    pub collateral: TokenInfo,
    pub asset: TokenInfo,
    pub borrowers: Vec<Address>,
    /// Sorted by descending coverage
    pub insolvent: Vec<InsolventBorrower>,
    pub probe_failures: Vec<ProbeFailure>,
    pub liquidations: Vec<HistoricalLiquidation>,
    pub attempts: Vec<LiquidationAttempt>,
    /// Set when the pair could not be processed to the end
    pub error: Option<String>,
}

impl PairReport {
    /// Report skeleton carrying the pair's current state.
    pub fn new(pair: &Pair) -> Self {
        Self {
            address: pair.address,
            name: pair.name(),
            collateral: pair.collateral.clone(),
            asset: pair.asset.clone(),
            borrowers: pair.borrowers.iter().copied().collect(),
            insolvent: Vec::new(),
            probe_failures: Vec::new(),
            liquidations: pair.liquidations.clone(),
            attempts: Vec::new(),
            error: None,
        }
    }

    pub fn failed(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Totals across a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassStatistics {
    pub pairs: usize,
    pub pairs_with_borrowers: usize,
    pub failed_pairs: usize,
    pub borrowers: usize,
    pub insolvent_borrowers: usize,
    pub probe_failures: usize,
    pub historical_liquidations: usize,
    /// Historical liquidations per liquidator address
    pub liquidators: BTreeMap<Address, usize>,
    pub submitted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PassStatistics {
    pub fn from_pairs(pairs: &[PairReport]) -> Self {
        let mut stats = Self {
            pairs: pairs.len(),
            ..Default::default()
        };
        for pair in pairs {
            if !pair.borrowers.is_empty() {
                stats.pairs_with_borrowers += 1;
            }
            if pair.error.is_some() {
                stats.failed_pairs += 1;
            }
            stats.borrowers += pair.borrowers.len();
            stats.insolvent_borrowers += pair.insolvent.len();
            stats.probe_failures += pair.probe_failures.len();
            stats.historical_liquidations += pair.liquidations.len();
            for liquidation in &pair.liquidations {
                *stats.liquidators.entry(liquidation.liquidator).or_default() += 1;
            }
            for attempt in &pair.attempts {
                match attempt.outcome {
                    AttemptOutcome::Submitted { .. } => stats.submitted += 1,
                    AttemptOutcome::Skipped { .. } => stats.skipped += 1,
                    AttemptOutcome::Failed { .. } => stats.failed += 1,
                }
            }
        }
        stats
    }
}

/// Result of one network pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub network: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Snapshot block every read was pinned to
    pub block: Option<BlockRef>,
    pub pairs: Vec<PairReport>,
    pub statistics: PassStatistics,
    /// Set when the pass could not start (no snapshot, discovery failure)
    pub error: Option<String>,
}

impl PassReport {
    pub fn new(network: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            network: network.into(),
            started_at,
            finished_at: started_at,
            block: None,
            pairs: Vec::new(),
            statistics: PassStatistics::default(),
            error: None,
        }
    }

    /// Sort pairs, compute statistics and stamp the finish time.
    pub fn finish(mut self) -> Self {
        self.pairs.sort_by_key(|p| p.address);
        self.statistics = PassStatistics::from_pairs(&self.pairs);
        self.finished_at = Utc::now();
        self
    }

    pub fn failed(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self.finish()
    }

    /// Log a one-line summary plus every failed unit of work.
    pub fn log_summary(&self) {
        let stats = &self.statistics;
        let elapsed_ms = (self.finished_at - self.started_at).num_milliseconds();

        if let Some(error) = &self.error {
            warn!(network = %self.network, error = %error, elapsed_ms, "Liquidation pass failed");
            return;
        }

        for pair in &self.pairs {
            if let Some(error) = &pair.error {
                warn!(network = %self.network, pair = %pair.address, name = %pair.name, error = %error, "Pair failed");
            }
        }

        info!(
            network = %self.network,
            block = self.block.map(|b| b.number).unwrap_or_default(),
            pairs = stats.pairs,
            pairs_with_borrowers = stats.pairs_with_borrowers,
            failed_pairs = stats.failed_pairs,
            borrowers = stats.borrowers,
            insolvent = stats.insolvent_borrowers,
            probe_failures = stats.probe_failures,
            historical_liquidations = stats.historical_liquidations,
            liquidators = stats.liquidators.len(),
            submitted = stats.submitted,
            skipped = stats.skipped,
            failed = stats.failed,
            elapsed_ms,
            "Liquidation pass complete"
        );
    }
}
