//! Kashi protocol implementation over JSON-RPC.

use alloy::eips::BlockId;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::Provider;
use alloy::rpc::types::BlockNumberOrTag;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{
    AccrueInfo, BlockRef, BorrowerPosition, KashiProtocol, LiquidationRequest, Rebase,
    SimulationOutcome,
};
use crate::contracts::{IBentoBox, IKashiPair, IERC20};
use crate::error::ChainError;
use crate::provider::ProviderManager;
use crate::signer::TransactionSender;

/// [`KashiProtocol`] backed by an RPC endpoint and an optional signer.
#[derive(Debug, Clone)]
pub struct KashiRpcProtocol {
    provider: ProviderManager,
    /// BentoBox vault holding pair collateral
    bento_box: Address,
    sender: Option<Arc<TransactionSender>>,
}

impl KashiRpcProtocol {
    /// Create a read-only protocol client.
    pub fn new(provider: ProviderManager, bento_box: Address) -> Self {
        Self {
            provider,
            bento_box,
            sender: None,
        }
    }

    /// Enable submissions through `sender`.
    pub fn with_sender(mut self, sender: Arc<TransactionSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn bento_box(&self) -> Address {
        self.bento_box
    }
}

#[async_trait]
impl KashiProtocol for KashiRpcProtocol {
    async fn snapshot_block(&self) -> Result<BlockRef, ChainError> {
        let provider = self.provider.provider().await;
        let block = provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| ChainError::MissingBlock("latest".to_string()))?;

        Ok(BlockRef {
            number: block.header.number,
            timestamp: block.header.timestamp,
        })
    }

    async fn total_borrow(&self, pair: Address, block: u64) -> Result<Rebase, ChainError> {
        let provider = self.provider.provider().await;
        let total = IKashiPair::new(pair, &provider)
            .totalBorrow()
            .block(BlockId::number(block))
            .call()
            .await?;
        Ok(Rebase::new(U256::from(total.elastic), U256::from(total.base)))
    }

    async fn accrue_info(&self, pair: Address, block: u64) -> Result<AccrueInfo, ChainError> {
        let provider = self.provider.provider().await;
        let info = IKashiPair::new(pair, &provider)
            .accrueInfo()
            .block(BlockId::number(block))
            .call()
            .await?;
        Ok(AccrueInfo {
            interest_per_second: info.interestPerSecond,
            last_accrued: info.lastAccrued,
            fees_earned_fraction: info.feesEarnedFraction,
        })
    }

    async fn vault_totals(&self, token: Address, block: u64) -> Result<Rebase, ChainError> {
        let provider = self.provider.provider().await;
        let totals = IBentoBox::new(self.bento_box, &provider)
            .totals(token)
            .block(BlockId::number(block))
            .call()
            .await?;
        Ok(Rebase::new(U256::from(totals.elastic), U256::from(totals.base)))
    }

    async fn refresh_exchange_rate(&self, pair: Address, block: u64) -> Result<U256, ChainError> {
        let provider = self.provider.provider().await;
        let refreshed = IKashiPair::new(pair, &provider)
            .updateExchangeRate()
            .block(BlockId::number(block))
            .call()
            .await?;
        debug!(pair = %pair, updated = refreshed.updated, rate = %refreshed.rate, "Exchange rate refreshed");
        Ok(refreshed.rate)
    }

    async fn borrower_position(
        &self,
        pair: Address,
        user: Address,
        block: u64,
    ) -> Result<BorrowerPosition, ChainError> {
        let collateral_share = {
            let provider = self.provider.provider().await;
            IKashiPair::new(pair, &provider)
                .userCollateralShare(user)
                .block(BlockId::number(block))
                .call()
                .await?
                ._0
        };
        let borrow_part = {
            let provider = self.provider.provider().await;
            IKashiPair::new(pair, &provider)
                .userBorrowPart(user)
                .block(BlockId::number(block))
                .call()
                .await?
                ._0
        };
        Ok(BorrowerPosition {
            collateral_share,
            borrow_part,
        })
    }

    #[instrument(level = "trace", skip(self, request), fields(user = ?request.users))]
    async fn simulate_liquidation(
        &self,
        pair: Address,
        request: &LiquidationRequest,
        from: Address,
        block: u64,
    ) -> Result<SimulationOutcome, ChainError> {
        let provider = self.provider.provider().await;
        let result = IKashiPair::new(pair, &provider)
            .liquidate(
                request.users.clone(),
                request.max_borrow_parts.clone(),
                request.to,
                request.swapper,
                request.open,
            )
            .from(from)
            .block(BlockId::number(block))
            .call()
            .await;

        match result.map_err(ChainError::from) {
            Ok(_) => Ok(SimulationOutcome::Succeeded),
            Err(ChainError::Reverted(reason)) => Ok(SimulationOutcome::Reverted { reason }),
            Err(e) => Err(e),
        }
    }

    async fn token_symbol(&self, token: Address) -> Result<String, ChainError> {
        let provider = self.provider.provider().await;
        let symbol = IERC20::new(token, &provider).symbol().call().await?._0;
        Ok(symbol)
    }

    async fn submit_liquidation(
        &self,
        pair: Address,
        request: &LiquidationRequest,
    ) -> Result<B256, ChainError> {
        let sender = self.sender.as_ref().ok_or(ChainError::NoSigner)?;
        sender.send_transaction(pair, request.calldata()).await
    }

    fn signer(&self) -> Option<Address> {
        self.sender.as_ref().map(|s| s.address)
    }
}
