//! Kashi pair state tracked across passes.

use alloy::primitives::{Address, B256, U256};
use kashi_chain::{AccrueInfo, BlockRef, DeployedPair, Rebase};
use serde::Serialize;
use std::collections::BTreeSet;

/// Token address with its display symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
}

/// Chain state of a pair read at one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairSnapshot {
    pub block: BlockRef,
    /// `totalBorrow` as stored on chain
    pub total_borrow: Rebase,
    pub accrue_info: AccrueInfo,
    /// `total_borrow` projected to the block timestamp
    pub projected_borrow: Rebase,
    /// BentoBox totals of the collateral token
    pub vault_totals: Rebase,
    /// Refreshed oracle rate, 1e18-scaled
    pub exchange_rate: U256,
}

/// A past successful `liquidate` call on a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoricalLiquidation {
    pub tx_hash: B256,
    pub liquidator: Address,
    pub block_number: u64,
}

/// A Kashi lending pair.
#[derive(Debug, Clone, Serialize)]
pub struct Pair {
    pub address: Address,
    pub collateral: TokenInfo,
    pub asset: TokenInfo,
    pub oracle: Address,
    /// Every address that ever borrowed; only grows
    pub borrowers: BTreeSet<Address>,
    pub liquidations: Vec<HistoricalLiquidation>,
    pub snapshot: Option<PairSnapshot>,
}

impl Pair {
    /// Pair discovered through `deployed`, with resolved token symbols.
    pub fn from_deployment(
        deployed: &DeployedPair,
        collateral_symbol: String,
        asset_symbol: String,
    ) -> Self {
        Self {
            address: deployed.address,
            collateral: TokenInfo {
                address: deployed.collateral,
                symbol: collateral_symbol,
            },
            asset: TokenInfo {
                address: deployed.asset,
                symbol: asset_symbol,
            },
            oracle: deployed.oracle,
            borrowers: BTreeSet::new(),
            liquidations: Vec::new(),
            snapshot: None,
        }
    }

    /// Display name, `collateral->asset`.
    pub fn name(&self) -> String {
        format!("{}->{}", self.collateral.symbol, self.asset.symbol)
    }

    /// Merge newly observed borrowers; returns how many were new.
    pub fn add_borrowers(&mut self, borrowers: impl IntoIterator<Item = Address>) -> usize {
        let before = self.borrowers.len();
        self.borrowers.extend(borrowers);
        self.borrowers.len() - before
    }
}

/// A borrower the probe found liquidatable, with sizing figures.
/// Valid for the pass that computed it only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsolventBorrower {
    pub address: Address,
    pub collateral_share: U256,
    pub collateral_amount: U256,
    /// Raw share of `totalBorrow.base`; liquidation size derives from it
    pub borrow_part: U256,
    pub borrow_amount: U256,
    /// Debt in collateral units, still carrying the 1e18 rate scale
    pub borrow_cost_in_collateral: U256,
    /// `f64::INFINITY` with zero collateral (serialized as `null`)
    pub coverage_percent: f64,
}
