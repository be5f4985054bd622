//! Liquidation pass orchestration.
//!
//! One pass pins a snapshot block, discovers pairs, then for each pair:
//! borrowers → solvency probe → sizing → execution. Pairs run concurrently
//! under a shared deadline and cancellation token; any failure stays inside
//! its pair's report. The deadline and token abort reads, but only stop new
//! submissions: a liquidation already sent always lands in the report.

use alloy::primitives::Address;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use kashi_api::{CancelToken, LogSource};
use kashi_chain::{BlockRef, KashiProtocol, SymbolCache};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::{BotConfig, Network};
use crate::discovery::PairDiscovery;
use crate::error::EngineError;
use crate::executor::LiquidationExecutor;
use crate::pair::Pair;
use crate::report::{PairReport, PassReport};
use crate::sizer::LiquidationSizer;
use crate::solvency::SolvencyProbe;

/// Runs liquidation passes for one network.
///
/// Known pairs and their borrower sets are kept between passes; borrowers
/// only ever accumulate.
pub struct LiquidationEngine {
    network: Arc<Network>,
    protocol: Arc<dyn KashiProtocol>,
    discovery: PairDiscovery,
    probe: SolvencyProbe,
    sizer: LiquidationSizer,
    executor: LiquidationExecutor,
    pair_concurrency: usize,
    deadline: Duration,
    collect_history: bool,
    cancel: CancelToken,
    pairs: Mutex<BTreeMap<Address, Pair>>,
}

impl LiquidationEngine {
    pub fn new(
        network: Arc<Network>,
        protocol: Arc<dyn KashiProtocol>,
        logs: Arc<dyn LogSource>,
        symbols: Arc<SymbolCache>,
        config: &BotConfig,
    ) -> Result<Self, EngineError> {
        let sender = config
            .probe
            .probe_sender()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        let sentinel = config
            .probe
            .sentinel_policy()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        let receiver = config
            .liquidation
            .receiver_address()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        let discovery = PairDiscovery::new(
            logs,
            protocol.clone(),
            symbols,
            network.bento_box,
            network.kashi_master,
        )
        .with_start_block(network.start_block);
        let probe = SolvencyProbe::new(protocol.clone(), sender, sentinel, config.probe.concurrency)
            .with_retry_policy(config.retry.policy());
        let sizer = LiquidationSizer::new(protocol.clone(), config.pass.sizing_concurrency);
        let executor = LiquidationExecutor::new(protocol.clone(), network.swapper)
            .with_receiver(receiver)
            .with_max_percent(config.liquidation.max_percent)
            .with_enabled(config.liquidation.enabled);

        Ok(Self {
            network,
            protocol,
            discovery,
            probe,
            sizer,
            executor,
            pair_concurrency: config.pass.pair_concurrency.max(1),
            deadline: config.pass.deadline(),
            collect_history: config.pass.collect_history,
            cancel: CancelToken::never(),
            pairs: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.probe = self.probe.with_cancel_token(cancel.clone());
        self.executor = self.executor.with_cancel_token(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Pairs known so far.
    pub fn known_pairs(&self) -> Vec<Pair> {
        self.pairs.lock().values().cloned().collect()
    }

    /// Run one full pass. Never fails: errors are carried in the report.
    #[instrument(skip(self), fields(network = %self.network.name))]
    pub async fn run_liquidation_pass(&self) -> PassReport {
        let mut report = PassReport::new(self.network.name.clone(), Utc::now());
        let deadline = Instant::now() + self.deadline;

        let block = match self.protocol.snapshot_block().await {
            Ok(block) => block,
            Err(e) => return report.failed(format!("snapshot block: {}", e)),
        };
        report.block = Some(block);
        info!(block = block.number, timestamp = block.timestamp, "Snapshot block pinned");

        let discovered = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            result = timeout_at(deadline, self.discovery.discover_pairs(block.number)) => {
                result.unwrap_or(Err(EngineError::DeadlineExceeded))
            }
        };
        let discovered = match discovered {
            Ok(pairs) => pairs,
            Err(e) => return report.failed(format!("pair discovery: {}", e)),
        };

        let pairs = self.merge_known(discovered);
        let results: Vec<(Pair, PairReport)> = stream::iter(pairs)
            .map(|pair| self.run_pair(pair, block, deadline))
            .buffer_unordered(self.pair_concurrency)
            .collect()
            .await;

        let mut known = self.pairs.lock();
        for (pair, pair_report) in results {
            known.insert(pair.address, pair);
            report.pairs.push(pair_report);
        }
        drop(known);

        let report = report.finish();
        report.log_summary();
        report
    }

    /// Fold freshly discovered pairs into the known set, keeping borrowers.
    fn merge_known(&self, discovered: Vec<Pair>) -> Vec<Pair> {
        let mut known = self.pairs.lock();
        for pair in discovered {
            match known.get_mut(&pair.address) {
                Some(existing) => {
                    existing.collateral = pair.collateral;
                    existing.asset = pair.asset;
                }
                None => {
                    debug!(pair = %pair.address, name = %pair.name(), "New pair");
                    known.insert(pair.address, pair);
                }
            }
        }
        known.values().cloned().collect()
    }

    /// Process one pair: reads under the pass deadline and cancellation
    /// token, then execution outside them.
    async fn run_pair(&self, mut pair: Pair, block: BlockRef, deadline: Instant) -> (Pair, PairReport) {
        let mut report = PairReport::new(&pair);

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            result = timeout_at(deadline, self.prepare_pair(&mut pair, &mut report, block)) => {
                result.unwrap_or(Err(EngineError::DeadlineExceeded))
            }
        };

        match result {
            Ok(()) if !report.insolvent.is_empty() => {
                self.executor
                    .execute(&pair, &report.insolvent, deadline, &mut report.attempts)
                    .await;
            }
            Ok(()) => {}
            Err(e) => {
                warn!(pair = %pair.address, name = %pair.name(), error = %e, "Pair processing failed");
                report.error = Some(e.to_string());
            }
        }
        (pair, report)
    }

    /// Discovery, probing and sizing; leaves sized borrowers in `report.insolvent`.
    #[instrument(skip_all, fields(pair = %pair.address, name = %pair.name()))]
    async fn prepare_pair(
        &self,
        pair: &mut Pair,
        report: &mut PairReport,
        block: BlockRef,
    ) -> Result<(), EngineError> {
        let added = self.discovery.discover_borrowers(pair, block.number).await?;
        report.borrowers = pair.borrowers.iter().copied().collect();
        if pair.borrowers.is_empty() {
            debug!("No borrowers");
            return Ok(());
        }

        if self.collect_history {
            match self.discovery.liquidation_history(pair).await {
                Ok(_) => report.liquidations = pair.liquidations.clone(),
                Err(e) => warn!(error = %e, "Liquidation history unavailable"),
            }
        }

        let total_borrow = self.protocol.total_borrow(pair.address, block.number).await?;
        let outcome = self
            .probe
            .probe_pair(pair.address, &report.borrowers, &total_borrow, block.number)
            .await;
        report.probe_failures = outcome.failures;
        info!(
            borrowers = report.borrowers.len(),
            new_borrowers = added,
            insolvent = outcome.insolvent.len(),
            "Pair probed"
        );
        if outcome.insolvent.is_empty() {
            return Ok(());
        }

        let snapshot = self.sizer.snapshot(pair, block, total_borrow).await?;
        report.insolvent = self
            .sizer
            .size(pair.address, &snapshot, &outcome.insolvent)
            .await?;
        pair.snapshot = Some(snapshot);
        Ok(())
    }
}
