//! Pair and borrower discovery from historical logs.
//!
//! Pairs come from BentoBox `LogDeploy` events of the Kashi master contract,
//! borrowers from each pair's `LogBorrow` events. Results are keyed by
//! address, so repeated discovery over the same range is a no-op.

use alloy::primitives::{Address, B256};
use kashi_api::{LogQuery, LogSource};
use kashi_chain::{
    decode_borrower, decode_deploy_log, event_signatures, DeployedPair, KashiProtocol,
    SymbolCache, LIQUIDATE_SELECTOR,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::EngineError;
use crate::pair::{HistoricalLiquidation, Pair};

/// Finds Kashi pairs, their borrowers and past liquidations on one chain.
#[derive(Clone)]
pub struct PairDiscovery {
    logs: Arc<dyn LogSource>,
    protocol: Arc<dyn KashiProtocol>,
    symbols: Arc<SymbolCache>,
    bento_box: Address,
    kashi_master: Address,
    start_block: u64,
}

impl std::fmt::Debug for PairDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairDiscovery")
            .field("bento_box", &self.bento_box)
            .field("kashi_master", &self.kashi_master)
            .field("start_block", &self.start_block)
            .finish()
    }
}

impl PairDiscovery {
    pub fn new(
        logs: Arc<dyn LogSource>,
        protocol: Arc<dyn KashiProtocol>,
        symbols: Arc<SymbolCache>,
        bento_box: Address,
        kashi_master: Address,
    ) -> Self {
        Self {
            logs,
            protocol,
            symbols,
            bento_box,
            kashi_master,
            start_block: 0,
        }
    }

    /// First block searched for deployments.
    pub fn with_start_block(mut self, start_block: u64) -> Self {
        self.start_block = start_block;
        self
    }

    /// Every pair deployed from the Kashi master contract up to `to_block`,
    /// sorted by address.
    #[instrument(skip(self), fields(bento_box = %self.bento_box))]
    pub async fn discover_pairs(&self, to_block: u64) -> Result<Vec<Pair>, EngineError> {
        let query = LogQuery::new(self.bento_box, event_signatures::LOG_DEPLOY)
            .with_topic1(self.kashi_master.into_word())
            .with_range(self.start_block, Some(to_block));
        let logs = self.logs.fetch_logs(&query).await?;

        let mut deployments: BTreeMap<Address, DeployedPair> = BTreeMap::new();
        for log in &logs {
            match decode_deploy_log(&log.topics, &log.data) {
                Ok(deployed) if deployed.master_contract == self.kashi_master => {
                    deployments.entry(deployed.address).or_insert(deployed);
                }
                Ok(deployed) => {
                    debug!(clone = %deployed.address, master = %deployed.master_contract, "Ignoring foreign deployment");
                }
                Err(e) => {
                    warn!(tx_hash = %log.transaction_hash, error = %e, "Undecodable LogDeploy");
                }
            }
        }

        let mut pairs = Vec::with_capacity(deployments.len());
        for deployed in deployments.values() {
            let collateral = self
                .symbols
                .get_or_fetch(deployed.collateral, self.protocol.as_ref())
                .await;
            let asset = self
                .symbols
                .get_or_fetch(deployed.asset, self.protocol.as_ref())
                .await;
            pairs.push(Pair::from_deployment(deployed, collateral, asset));
        }

        info!(logs = logs.len(), pairs = pairs.len(), "Discovered Kashi pairs");
        Ok(pairs)
    }

    /// Merge every address that ever borrowed from `pair` up to `to_block`.
    /// Returns the number of new borrowers.
    #[instrument(skip(self, pair), fields(pair = %pair.address))]
    pub async fn discover_borrowers(
        &self,
        pair: &mut Pair,
        to_block: u64,
    ) -> Result<usize, EngineError> {
        let query = LogQuery::new(pair.address, event_signatures::LOG_BORROW)
            .with_range(self.start_block, Some(to_block));
        let logs = self.logs.fetch_logs(&query).await?;

        let borrowers: BTreeSet<Address> = logs
            .iter()
            .filter_map(|log| match decode_borrower(&log.topics) {
                Ok(borrower) => Some(borrower),
                Err(e) => {
                    warn!(tx_hash = %log.transaction_hash, error = %e, "Undecodable LogBorrow");
                    None
                }
            })
            .collect();

        let added = pair.add_borrowers(borrowers);
        debug!(
            logs = logs.len(),
            borrowers = pair.borrowers.len(),
            added,
            "Borrowers discovered"
        );
        Ok(added)
    }

    /// Replace the pair's liquidation history with every successful
    /// `liquidate` transaction sent to it.
    #[instrument(skip(self, pair), fields(pair = %pair.address))]
    pub async fn liquidation_history(&self, pair: &mut Pair) -> Result<usize, EngineError> {
        let transactions = self
            .logs
            .fetch_address_transactions(pair.address, 0)
            .await?;

        let mut seen: BTreeSet<B256> = BTreeSet::new();
        pair.liquidations = transactions
            .into_iter()
            .filter(|tx| tx.succeeded() && tx.calls(LIQUIDATE_SELECTOR))
            .filter(|tx| seen.insert(tx.hash))
            .map(|tx| HistoricalLiquidation {
                tx_hash: tx.hash,
                liquidator: tx.from,
                block_number: tx.block_number,
            })
            .collect();

        debug!(liquidations = pair.liquidations.len(), "Liquidation history collected");
        Ok(pair.liquidations.len())
    }
}
