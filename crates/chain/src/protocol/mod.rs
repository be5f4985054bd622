//! Kashi protocol access layer.
//!
//! The core engine talks to a chain only through [`KashiProtocol`], so every
//! stage (probe, sizing, execution) can be exercised against a mock.
//!
//! # Example
//!
//! ```rust,ignore
//! use kashi_chain::protocol::{KashiProtocol, LiquidationRequest};
//!
//! let block = protocol.snapshot_block().await?;
//! let request = LiquidationRequest::probe(borrower, sentinel);
//! let outcome = protocol
//!     .simulate_liquidation(pair, &request, pair, block.number)
//!     .await?;
//! ```

mod events;
mod kashi;

pub use events::{decode_borrower, decode_deploy_log, DeployedPair};
pub use kashi::KashiRpcProtocol;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;

use crate::contracts::{IKashiPair, PROBE_RECIPIENT};
use crate::error::ChainError;

/// Base/elastic accounting pair mapping shares to real amounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Rebase {
    /// Real token amount
    pub elastic: U256,
    /// Internal share count
    pub base: U256,
}

impl Rebase {
    pub fn new(elastic: impl Into<U256>, base: impl Into<U256>) -> Self {
        Self {
            elastic: elastic.into(),
            base: base.into(),
        }
    }
}

/// Interest accrual parameters of a pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccrueInfo {
    /// Interest rate per second, 1e18-scaled
    pub interest_per_second: u64,
    /// Unix timestamp of the last on-chain accrual
    pub last_accrued: u64,
    pub fees_earned_fraction: u128,
}

/// Block every read of a pass is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockRef {
    pub number: u64,
    /// Unix seconds
    pub timestamp: u64,
}

/// A borrower's raw position in pair-internal units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BorrowerPosition {
    /// BentoBox share of collateral
    pub collateral_share: U256,
    /// Share of the pair's `totalBorrow.base`
    pub borrow_part: U256,
}

/// Arguments of `liquidate(users, maxBorrowParts, to, swapper, open)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationRequest {
    pub users: Vec<Address>,
    pub max_borrow_parts: Vec<U256>,
    pub to: Address,
    pub swapper: Address,
    pub open: bool,
}

impl LiquidationRequest {
    /// Open-mode simulation with a discard recipient and no swapper.
    pub fn probe(user: Address, sentinel: U256) -> Self {
        Self {
            users: vec![user],
            max_borrow_parts: vec![sentinel],
            to: PROBE_RECIPIENT,
            swapper: Address::ZERO,
            open: true,
        }
    }

    /// Closed-mode liquidation of `part` of `user`'s debt.
    pub fn closed(user: Address, part: U256, to: Address, swapper: Address) -> Self {
        Self {
            users: vec![user],
            max_borrow_parts: vec![part],
            to,
            swapper,
            open: false,
        }
    }

    /// ABI-encoded call data.
    pub fn calldata(&self) -> Bytes {
        IKashiPair::liquidateCall {
            users: self.users.clone(),
            maxBorrowParts: self.max_borrow_parts.clone(),
            to: self.to,
            swapper: self.swapper,
            open: self.open,
        }
        .abi_encode()
        .into()
    }
}

/// Result of a read-only liquidation simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationOutcome {
    /// The call would succeed: the borrower is insolvent.
    Succeeded,
    /// The call reverts: the borrower is solvent (or not liquidatable).
    Reverted { reason: String },
}

/// Chain operations the liquidation engine needs.
///
/// Every read takes the block number it must be pinned to so that one pass
/// sees a single consistent chain state.
#[async_trait]
pub trait KashiProtocol: Send + Sync + Debug {
    /// Latest block, fixed as the snapshot for a pass.
    async fn snapshot_block(&self) -> Result<BlockRef, ChainError>;

    async fn total_borrow(&self, pair: Address, block: u64) -> Result<Rebase, ChainError>;

    async fn accrue_info(&self, pair: Address, block: u64) -> Result<AccrueInfo, ChainError>;

    /// BentoBox `totals(token)`.
    async fn vault_totals(&self, token: Address, block: u64) -> Result<Rebase, ChainError>;

    /// Simulate `updateExchangeRate()` and return the rate the next real
    /// liquidation would use (1e18-scaled).
    async fn refresh_exchange_rate(&self, pair: Address, block: u64) -> Result<U256, ChainError>;

    async fn borrower_position(
        &self,
        pair: Address,
        user: Address,
        block: u64,
    ) -> Result<BorrowerPosition, ChainError>;

    /// Read-only `liquidate` call sent from `from`. A revert is reported as
    /// [`SimulationOutcome::Reverted`], never as an error.
    async fn simulate_liquidation(
        &self,
        pair: Address,
        request: &LiquidationRequest,
        from: Address,
        block: u64,
    ) -> Result<SimulationOutcome, ChainError>;

    async fn token_symbol(&self, token: Address) -> Result<String, ChainError>;

    /// Sign and submit a real liquidation; returns the mined transaction hash,
    /// or [`ChainError::Unconfirmed`] when it was sent but not yet mined.
    async fn submit_liquidation(
        &self,
        pair: Address,
        request: &LiquidationRequest,
    ) -> Result<B256, ChainError>;

    /// Address that signs submissions, if any.
    fn signer(&self) -> Option<Address>;
}
