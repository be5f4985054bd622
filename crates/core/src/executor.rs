//! Liquidation executor.
//!
//! Turns sized insolvent borrowers into closed-mode `liquidate` calls. Each
//! submission is isolated: a failure is recorded for that borrower and the
//! batch continues.

use alloy::primitives::{Address, U256};
use kashi_api::CancelToken;
use kashi_chain::{ChainError, KashiProtocol, LiquidationRequest};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::pair::{InsolventBorrower, Pair};
use crate::report::{AttemptOutcome, LiquidationAttempt};

/// Default cap on the share of a borrower's debt repaid per call.
pub const DEFAULT_MAX_PERCENT: u64 = 50;

/// Percent of the borrow part to repay for a given coverage:
/// `min(ceil(coverage - 100), max_percent)`, at least 1.
///
/// `None` when coverage is not above 100%.
pub fn liquidation_percent(coverage_percent: f64, max_percent: u64) -> Option<u64> {
    if coverage_percent.is_nan() || coverage_percent <= 100.0 {
        return None;
    }
    let excess = (coverage_percent - 100.0).ceil();
    let percent = if excess >= max_percent as f64 {
        max_percent
    } else {
        excess as u64
    };
    Some(percent.max(1))
}

/// `borrow_part * percent / 100`, truncating.
pub fn part_to_repay(borrow_part: U256, percent: u64) -> U256 {
    borrow_part.saturating_mul(U256::from(percent)) / U256::from(100u64)
}

/// Submits liquidations for one chain.
#[derive(Debug, Clone)]
pub struct LiquidationExecutor {
    protocol: Arc<dyn KashiProtocol>,
    /// Recipient of seized collateral; the signer when unset
    receiver: Option<Address>,
    /// Whitelisted swapper closed liquidations settle through
    swapper: Address,
    max_percent: u64,
    enabled: bool,
    cancel: CancelToken,
}

impl LiquidationExecutor {
    pub fn new(protocol: Arc<dyn KashiProtocol>, swapper: Address) -> Self {
        Self {
            protocol,
            receiver: None,
            swapper,
            max_percent: DEFAULT_MAX_PERCENT,
            enabled: true,
            cancel: CancelToken::never(),
        }
    }

    pub fn with_receiver(mut self, receiver: Option<Address>) -> Self {
        self.receiver = receiver;
        self
    }

    pub fn with_max_percent(mut self, max_percent: u64) -> Self {
        self.max_percent = max_percent.clamp(1, 100);
        self
    }

    /// Disable submissions; every attempt is reported as skipped.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Stop starting new submissions once cancelled.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Submit one liquidation per borrower, in the given order, appending
    /// each attempt to `attempts` as soon as it completes.
    ///
    /// No submission is started after `deadline` or cancellation; one that
    /// has started always runs to its outcome.
    #[instrument(skip_all, fields(pair = %pair.address, name = %pair.name(), borrowers = borrowers.len()))]
    pub async fn execute(
        &self,
        pair: &Pair,
        borrowers: &[InsolventBorrower],
        deadline: Instant,
        attempts: &mut Vec<LiquidationAttempt>,
    ) {
        let receiver = self.receiver.or_else(|| self.protocol.signer());
        attempts.reserve(borrowers.len());

        // Sequential on purpose: one signer, ordered nonces
        for borrower in borrowers {
            let Some(percent) = liquidation_percent(borrower.coverage_percent, self.max_percent)
            else {
                attempts.push(LiquidationAttempt::skipped(
                    borrower.address,
                    None,
                    format!("coverage {:.2}% does not exceed 100%", borrower.coverage_percent),
                ));
                continue;
            };
            let skip = |reason: &str| {
                LiquidationAttempt::skipped(borrower.address, Some(percent), reason.to_string())
            };

            let part = part_to_repay(borrower.borrow_part, percent);
            let attempt = match receiver {
                _ if !self.enabled => skip("submission disabled"),
                None => skip("no signer configured"),
                Some(_) if self.swapper == Address::ZERO => skip("no swapper configured"),
                Some(_) if part.is_zero() => skip("part rounds to zero"),
                Some(_) if self.cancel.is_cancelled() => skip("cancelled"),
                Some(_) if Instant::now() >= deadline => skip("pass deadline exceeded"),
                Some(receiver) => self.submit(pair, borrower, percent, part, receiver).await,
            };
            attempts.push(attempt);
        }
    }

    async fn submit(
        &self,
        pair: &Pair,
        borrower: &InsolventBorrower,
        percent: u64,
        part: U256,
        receiver: Address,
    ) -> LiquidationAttempt {
        info!(
            borrower = %borrower.address,
            percent = percent,
            part = %part,
            coverage = borrower.coverage_percent,
            "Liquidating {}% of {} on {}",
            percent,
            borrower.address,
            pair.name()
        );

        let request = LiquidationRequest::closed(borrower.address, part, receiver, self.swapper);
        let start = Instant::now();
        let outcome = match self.protocol.submit_liquidation(pair.address, &request).await {
            Ok(tx_hash) => {
                info!(
                    borrower = %borrower.address,
                    tx_hash = %tx_hash,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Liquidation submitted"
                );
                AttemptOutcome::Submitted {
                    tx_hash,
                    confirmed: true,
                }
            }
            Err(ChainError::Unconfirmed(tx_hash)) => {
                warn!(
                    borrower = %borrower.address,
                    tx_hash = %tx_hash,
                    "Liquidation sent, receipt still pending"
                );
                AttemptOutcome::Submitted {
                    tx_hash,
                    confirmed: false,
                }
            }
            Err(e) => {
                warn!(
                    pair = %pair.address,
                    borrower = %borrower.address,
                    error = %e,
                    "Liquidation failed"
                );
                AttemptOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        LiquidationAttempt {
            borrower: borrower.address,
            percent: Some(percent),
            part,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{addr, insolvent_borrower, u, MockPair, MockProtocol};
    use kashi_api::Cancellation;
    use std::time::Duration;

    #[test]
    fn test_liquidation_percent() {
        assert_eq!(liquidation_percent(137.0, 50), Some(37));
        assert_eq!(liquidation_percent(100.4, 50), Some(1));
        assert_eq!(liquidation_percent(500.0, 50), Some(50));
        assert_eq!(liquidation_percent(150.0, 50), Some(50));
        assert_eq!(liquidation_percent(f64::INFINITY, 50), Some(50));
        assert_eq!(liquidation_percent(100.0, 50), None);
        assert_eq!(liquidation_percent(42.0, 50), None);
        assert_eq!(liquidation_percent(f64::NAN, 50), None);
    }

    #[test]
    fn test_part_to_repay() {
        assert_eq!(part_to_repay(u(1_000), 37), u(370));
        assert_eq!(part_to_repay(u(999), 1), u(9));
        assert_eq!(part_to_repay(u(3), 50), u(1));
    }

    const SWAPPER: Address = Address::new([0x5a; 20]);

    fn setup() -> (Arc<MockProtocol>, Pair) {
        let pair = MockPair::new(addr(0x10));
        let protocol = Arc::new(MockProtocol::new().with_signer(addr(0xee)));
        protocol.add_pair(pair.clone());
        (protocol, pair.to_pair())
    }

    async fn run(
        executor: &LiquidationExecutor,
        pair: &Pair,
        borrowers: &[InsolventBorrower],
    ) -> Vec<LiquidationAttempt> {
        let mut attempts = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(60);
        executor.execute(pair, borrowers, deadline, &mut attempts).await;
        attempts
    }

    fn skip_reason(attempt: &LiquidationAttempt) -> &str {
        match &attempt.outcome {
            AttemptOutcome::Skipped { reason } => reason,
            other => panic!("expected a skipped attempt, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submits_closed_liquidation_to_receiver() {
        let (protocol, pair) = setup();
        let executor = LiquidationExecutor::new(protocol.clone(), SWAPPER);

        let attempts = run(&executor, &pair, &[insolvent_borrower(addr(1), 1_000, 137.0)]).await;

        assert_eq!(attempts.len(), 1);
        assert!(matches!(
            attempts[0].outcome,
            AttemptOutcome::Submitted { confirmed: true, .. }
        ));
        assert_eq!(attempts[0].part, u(370));

        let submissions = protocol.submissions();
        let (target, request) = &submissions[0];
        assert_eq!(*target, pair.address);
        assert_eq!(request.to, addr(0xee));
        assert_eq!(request.swapper, SWAPPER);
        assert_eq!(request.max_borrow_parts, vec![u(370)]);
        assert!(!request.open);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let (protocol, pair) = setup();
        protocol.fail_submission(addr(1));
        let executor = LiquidationExecutor::new(protocol.clone(), SWAPPER);

        let attempts = run(
            &executor,
            &pair,
            &[
                insolvent_borrower(addr(1), 1_000, 160.0),
                insolvent_borrower(addr(2), 1_000, 120.0),
            ],
        )
        .await;

        assert!(matches!(attempts[0].outcome, AttemptOutcome::Failed { .. }));
        assert!(matches!(attempts[1].outcome, AttemptOutcome::Submitted { .. }));
        assert_eq!(attempts[1].part, u(200));
    }

    #[tokio::test]
    async fn test_unconfirmed_submission_is_reported_as_sent() {
        let (protocol, pair) = setup();
        protocol.leave_unconfirmed(addr(1));
        let executor = LiquidationExecutor::new(protocol.clone(), SWAPPER);

        let attempts = run(&executor, &pair, &[insolvent_borrower(addr(1), 1_000, 130.0)]).await;

        assert!(matches!(
            attempts[0].outcome,
            AttemptOutcome::Submitted { confirmed: false, .. }
        ));
        assert_eq!(protocol.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_non_positive_excess_is_skipped() {
        let (protocol, pair) = setup();
        let executor = LiquidationExecutor::new(protocol.clone(), SWAPPER);

        let attempts = run(&executor, &pair, &[insolvent_borrower(addr(1), 1_000, 99.5)]).await;

        assert!(matches!(attempts[0].outcome, AttemptOutcome::Skipped { .. }));
        assert!(protocol.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_zero_part_is_never_submitted() {
        let (protocol, pair) = setup();
        let executor = LiquidationExecutor::new(protocol.clone(), SWAPPER);

        // 1 * 37 / 100 truncates to nothing
        let attempts = run(&executor, &pair, &[insolvent_borrower(addr(1), 1, 137.0)]).await;

        assert_eq!(skip_reason(&attempts[0]), "part rounds to zero");
        assert_eq!(attempts[0].percent, Some(37));
        assert!(attempts[0].part.is_zero());
        assert!(protocol.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_missing_swapper_skips_closed_liquidation() {
        let (protocol, pair) = setup();
        let executor = LiquidationExecutor::new(protocol.clone(), Address::ZERO);

        let attempts = run(&executor, &pair, &[insolvent_borrower(addr(1), 1_000, 137.0)]).await;

        assert_eq!(skip_reason(&attempts[0]), "no swapper configured");
        assert!(protocol.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_or_unsigned_executor_skips() {
        let (protocol, pair) = setup();
        let executor = LiquidationExecutor::new(protocol.clone(), SWAPPER).with_enabled(false);
        let attempts = run(&executor, &pair, &[insolvent_borrower(addr(1), 1_000, 130.0)]).await;
        assert_eq!(skip_reason(&attempts[0]), "submission disabled");
        assert_eq!(attempts[0].percent, Some(30));

        let unsigned = Arc::new(MockProtocol::new());
        let executor = LiquidationExecutor::new(unsigned.clone(), SWAPPER);
        let attempts = run(&executor, &pair, &[insolvent_borrower(addr(1), 1_000, 130.0)]).await;
        assert_eq!(skip_reason(&attempts[0]), "no signer configured");
        assert!(unsigned.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_submission_outlives_deadline() {
        let (protocol, pair) = setup();
        protocol.set_submission_delay(Duration::from_secs(6));
        let executor = LiquidationExecutor::new(protocol.clone(), SWAPPER);

        let mut attempts = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        executor
            .execute(
                &pair,
                &[
                    insolvent_borrower(addr(1), 1_000, 130.0),
                    insolvent_borrower(addr(2), 1_000, 120.0),
                    insolvent_borrower(addr(3), 1_000, 110.0),
                ],
                deadline,
                &mut attempts,
            )
            .await;

        // Second submission starts at 6s and finishes past the deadline
        assert_eq!(attempts.len(), 3);
        assert!(matches!(attempts[0].outcome, AttemptOutcome::Submitted { .. }));
        assert!(matches!(attempts[1].outcome, AttemptOutcome::Submitted { .. }));
        assert_eq!(skip_reason(&attempts[2]), "pass deadline exceeded");
        assert_eq!(protocol.submissions().len(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_stops_new_submissions() {
        let (protocol, pair) = setup();
        let cancellation = Cancellation::new();
        let executor = LiquidationExecutor::new(protocol.clone(), SWAPPER)
            .with_cancel_token(cancellation.token());
        cancellation.cancel();

        let attempts = run(&executor, &pair, &[insolvent_borrower(addr(1), 1_000, 130.0)]).await;

        assert_eq!(skip_reason(&attempts[0]), "cancelled");
        assert!(protocol.submissions().is_empty());
    }
}
