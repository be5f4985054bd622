//! Solvency probe.
//!
//! A borrower is insolvent exactly when the protocol would let them be
//! liquidated: the probe simulates an open-mode `liquidate` for one borrower
//! with a sentinel part and reads the outcome. The collateralization formula
//! is never reimplemented here.

use alloy::primitives::{Address, U256};
use futures::stream::{self, StreamExt};
use kashi_api::{retry, CancelToken, RetryError, RetryPolicy};
use kashi_chain::{ChainError, KashiProtocol, LiquidationRequest, Rebase, SimulationOutcome};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Sender of the simulated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeSender {
    /// The pair itself; Kashi only lets open liquidations through for
    /// whitelisted or self calls.
    PairSelf,
    /// A fixed address, for deployments without the caller check.
    Neutral(Address),
}

impl ProbeSender {
    fn resolve(&self, pair: Address) -> Address {
        match self {
            Self::PairSelf => pair,
            Self::Neutral(address) => *address,
        }
    }
}

/// Default probe part. `liquidate` repays `min(part, userBorrowPart)`, so
/// any positive part proves eligibility; a small one keeps the simulated
/// BentoBox transfer within the pair's idle balance.
pub const DEFAULT_SENTINEL: u64 = 34_444;

/// Source of the borrow part passed to the simulated `liquidate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelPolicy {
    /// The pair's `totalBorrow.base`. Simulates repaying the whole debt,
    /// which reverts on pairs whose idle asset balance is below it.
    TotalBorrowBase,
    Fixed(U256),
}

impl Default for SentinelPolicy {
    fn default() -> Self {
        Self::Fixed(U256::from(DEFAULT_SENTINEL))
    }
}

impl SentinelPolicy {
    /// Sentinel for a pair, `None` when the pair has no debt to probe.
    pub fn sentinel(&self, total_borrow: &Rebase) -> Option<U256> {
        if total_borrow.base.is_zero() {
            return None;
        }
        match self {
            Self::TotalBorrowBase => Some(total_borrow.base),
            Self::Fixed(value) => Some(*value),
        }
    }
}

/// A borrower whose solvency could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeFailure {
    pub borrower: Address,
    pub error: String,
}

/// Outcome of probing every borrower of one pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Liquidatable borrowers, in input order
    pub insolvent: Vec<Address>,
    pub solvent: usize,
    pub failures: Vec<ProbeFailure>,
}

/// Decides insolvency by simulated liquidation.
#[derive(Debug, Clone)]
pub struct SolvencyProbe {
    protocol: Arc<dyn KashiProtocol>,
    sender: ProbeSender,
    sentinel: SentinelPolicy,
    concurrency: usize,
    retry_policy: RetryPolicy,
    cancel: CancelToken,
}

impl SolvencyProbe {
    pub fn new(
        protocol: Arc<dyn KashiProtocol>,
        sender: ProbeSender,
        sentinel: SentinelPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            protocol,
            sender,
            sentinel,
            concurrency: concurrency.max(1),
            retry_policy: RetryPolicy::default(),
            cancel: CancelToken::never(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Probe `borrowers` of `pair` at `block`.
    #[instrument(skip(self, borrowers, total_borrow), fields(borrowers = borrowers.len()))]
    pub async fn probe_pair(
        &self,
        pair: Address,
        borrowers: &[Address],
        total_borrow: &Rebase,
        block: u64,
    ) -> ProbeOutcome {
        let Some(sentinel) = self.sentinel.sentinel(total_borrow) else {
            debug!(pair = %pair, "Pair has no outstanding debt, skipping probe");
            return ProbeOutcome {
                solvent: borrowers.len(),
                ..Default::default()
            };
        };
        let from = self.sender.resolve(pair);

        let results: Vec<(usize, Address, Result<bool, String>)> =
            stream::iter(borrowers.iter().copied().enumerate())
                .map(|(index, borrower)| async move {
                    let result = self.probe_borrower(pair, borrower, sentinel, from, block).await;
                    (index, borrower, result)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        let mut sorted = results;
        sorted.sort_by_key(|(index, _, _)| *index);

        let mut outcome = ProbeOutcome::default();
        for (_, borrower, result) in sorted {
            match result {
                Ok(true) => outcome.insolvent.push(borrower),
                Ok(false) => outcome.solvent += 1,
                Err(error) => {
                    warn!(pair = %pair, borrower = %borrower, error = %error, "Solvency probe failed");
                    outcome.failures.push(ProbeFailure { borrower, error });
                }
            }
        }

        info!(
            pair = %pair,
            insolvent = outcome.insolvent.len(),
            solvent = outcome.solvent,
            failed = outcome.failures.len(),
            "Solvency probe complete"
        );
        outcome
    }

    /// `Ok(true)` when the simulated liquidation succeeds.
    async fn probe_borrower(
        &self,
        pair: Address,
        borrower: Address,
        sentinel: U256,
        from: Address,
        block: u64,
    ) -> Result<bool, String> {
        let request = LiquidationRequest::probe(borrower, sentinel);
        let result = retry(
            &self.retry_policy,
            &self.cancel,
            "solvency probe",
            ChainError::is_transient,
            || self.protocol.simulate_liquidation(pair, &request, from, block),
        )
        .await;

        match result {
            Ok(SimulationOutcome::Succeeded) => Ok(true),
            Ok(SimulationOutcome::Reverted { reason }) => {
                debug!(borrower = %borrower, reason = %reason, "Borrower is solvent");
                Ok(false)
            }
            Err(RetryError::Cancelled) => Err("cancelled".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}
