//! Liquidation sizing for insolvent borrowers.
//!
//! Pair-level figures are read once at the snapshot block, then every
//! borrower's position is converted to real amounts and a coverage ratio.

use alloy::primitives::Address;
use futures::stream::{self, StreamExt, TryStreamExt};
use kashi_chain::{BlockRef, BorrowerPosition, KashiProtocol, Rebase};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{EngineError, MathError};
use crate::pair::{InsolventBorrower, Pair, PairSnapshot};
use crate::rebase_math::{coverage_percent, project_accrual, to_elastic};

/// Compute the sizing figures of one borrower against a pair snapshot.
pub fn size_borrower(
    address: Address,
    position: &BorrowerPosition,
    snapshot: &PairSnapshot,
) -> Result<InsolventBorrower, MathError> {
    let borrow_amount = to_elastic(&snapshot.projected_borrow, position.borrow_part)?;
    let scaled_part = position
        .borrow_part
        .checked_mul(snapshot.exchange_rate)
        .ok_or(MathError::Overflow("borrow cost"))?;
    let borrow_cost_in_collateral = to_elastic(&snapshot.projected_borrow, scaled_part)?;
    let collateral_amount = to_elastic(&snapshot.vault_totals, position.collateral_share)?;
    let coverage_percent = coverage_percent(borrow_cost_in_collateral, collateral_amount)?;

    Ok(InsolventBorrower {
        address,
        collateral_share: position.collateral_share,
        collateral_amount,
        borrow_part: position.borrow_part,
        borrow_amount,
        borrow_cost_in_collateral,
        coverage_percent,
    })
}

/// Descending coverage; infinite coverage first.
pub fn sort_by_coverage(borrowers: &mut [InsolventBorrower]) {
    borrowers.sort_by(|a, b| {
        b.coverage_percent
            .partial_cmp(&a.coverage_percent)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.address.cmp(&b.address))
    });
}

/// Reads pair figures and sizes insolvent borrowers.
#[derive(Debug, Clone)]
pub struct LiquidationSizer {
    protocol: Arc<dyn KashiProtocol>,
    concurrency: usize,
}

impl LiquidationSizer {
    pub fn new(protocol: Arc<dyn KashiProtocol>, concurrency: usize) -> Self {
        Self {
            protocol,
            concurrency: concurrency.max(1),
        }
    }

    /// Read accrual parameters, vault totals and the refreshed exchange rate
    /// at `block`, and project `total_borrow` to the block timestamp.
    #[instrument(skip(self, pair, total_borrow), fields(pair = %pair.address))]
    pub async fn snapshot(
        &self,
        pair: &Pair,
        block: BlockRef,
        total_borrow: Rebase,
    ) -> Result<PairSnapshot, EngineError> {
        let (accrue_info, vault_totals, exchange_rate) = tokio::try_join!(
            self.protocol.accrue_info(pair.address, block.number),
            self.protocol.vault_totals(pair.collateral.address, block.number),
            self.protocol.refresh_exchange_rate(pair.address, block.number),
        )?;

        let projected_borrow = project_accrual(&total_borrow, &accrue_info, block.timestamp)?;
        debug!(
            elastic = %total_borrow.elastic,
            projected = %projected_borrow.elastic,
            exchange_rate = %exchange_rate,
            "Pair snapshot read"
        );

        Ok(PairSnapshot {
            block,
            total_borrow,
            accrue_info,
            projected_borrow,
            vault_totals,
            exchange_rate,
        })
    }

    /// Size every borrower in `insolvent`. Any read or math failure fails the
    /// whole pair. Output is sorted by descending coverage.
    #[instrument(skip(self, snapshot, insolvent), fields(count = insolvent.len()))]
    pub async fn size(
        &self,
        pair: Address,
        snapshot: &PairSnapshot,
        insolvent: &[Address],
    ) -> Result<Vec<InsolventBorrower>, EngineError> {
        let block = snapshot.block.number;
        let mut sized: Vec<InsolventBorrower> = stream::iter(insolvent.iter().copied())
            .map(|borrower| async move {
                let position = self.protocol.borrower_position(pair, borrower, block).await?;
                let sized = size_borrower(borrower, &position, snapshot)?;
                Ok::<_, EngineError>(sized)
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        sort_by_coverage(&mut sized);
        Ok(sized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rebase_math::E18;
    use alloy::primitives::U256;
    use crate::testing::{addr, u, MockPair, MockProtocol};
    use kashi_chain::AccrueInfo;

    fn snapshot(projected: Rebase, vault: Rebase, rate: U256) -> PairSnapshot {
        PairSnapshot {
            block: BlockRef {
                number: 1,
                timestamp: 0,
            },
            total_borrow: projected,
            accrue_info: AccrueInfo::default(),
            projected_borrow: projected,
            vault_totals: vault,
            exchange_rate: rate,
        }
    }

    #[test]
    fn test_size_borrower() {
        // 1 asset unit = 2 collateral units; debt grew 10%; vault share 1:1
        let snap = snapshot(
            Rebase::new(u(1_100), u(1_000)),
            Rebase::new(u(5_000), u(5_000)),
            u(2) * E18,
        );
        let position = BorrowerPosition {
            collateral_share: u(1_000),
            borrow_part: u(500),
        };

        let sized = size_borrower(addr(1), &position, &snap).unwrap();
        assert_eq!(sized.borrow_amount, u(550));
        assert_eq!(sized.borrow_cost_in_collateral, u(1_100) * E18);
        assert_eq!(sized.collateral_amount, u(1_000));
        assert_eq!(sized.coverage_percent, 110.0);
        assert_eq!(sized.borrow_part, u(500));
    }

    #[test]
    fn test_zero_base_falls_back_to_one_to_one() {
        let snap = snapshot(Rebase::default(), Rebase::default(), E18);
        let position = BorrowerPosition {
            collateral_share: u(100),
            borrow_part: u(150),
        };

        let sized = size_borrower(addr(1), &position, &snap).unwrap();
        assert_eq!(sized.borrow_amount, u(150));
        assert_eq!(sized.collateral_amount, u(100));
        assert_eq!(sized.coverage_percent, 150.0);
    }

    #[test]
    fn test_zero_collateral_is_infinite_coverage() {
        let snap = snapshot(Rebase::new(u(10), u(10)), Rebase::new(u(10), u(10)), E18);
        let position = BorrowerPosition {
            collateral_share: U256::ZERO,
            borrow_part: u(5),
        };
        let sized = size_borrower(addr(1), &position, &snap).unwrap();
        assert!(sized.coverage_percent.is_infinite());
    }

    #[test]
    fn test_overflow_fails_sizing() {
        let snap = snapshot(Rebase::new(u(10), u(10)), Rebase::new(u(10), u(10)), U256::MAX);
        let position = BorrowerPosition {
            collateral_share: u(1),
            borrow_part: u(2),
        };
        assert!(matches!(
            size_borrower(addr(1), &position, &snap),
            Err(MathError::Overflow(_))
        ));
    }

    #[tokio::test]
    async fn test_size_sorts_by_descending_coverage() {
        let mut pair = MockPair::new(addr(0x10));
        pair.borrower(addr(1), 1_000, 510)
            .borrower(addr(2), 1_000, 900)
            .borrower(addr(3), 0, 10);
        let protocol = Arc::new(MockProtocol::new());
        protocol.add_pair(pair.clone());

        let sizer = LiquidationSizer::new(protocol.clone(), 2);
        let snap = sizer
            .snapshot(&pair.to_pair(), protocol.block(), pair.total_borrow)
            .await
            .unwrap();
        let sized = sizer
            .size(pair.address, &snap, &[addr(1), addr(2), addr(3)])
            .await
            .unwrap();

        let order: Vec<_> = sized.iter().map(|b| b.address).collect();
        assert_eq!(order, vec![addr(3), addr(2), addr(1)]);
    }

    #[tokio::test]
    async fn test_collateral_uses_vault_totals() {
        let mut pair = MockPair::new(addr(0x10));
        pair.borrower(addr(1), 1_000, 1_000);
        let protocol = Arc::new(MockProtocol::new());
        protocol.add_pair(pair.clone());
        // Vault has earned yield: one share is worth two tokens
        protocol.set_vault(pair.collateral, Rebase::new(u(2_000), u(1_000)));

        let sizer = LiquidationSizer::new(protocol.clone(), 1);
        let snap = sizer
            .snapshot(&pair.to_pair(), protocol.block(), pair.total_borrow)
            .await
            .unwrap();
        let sized = sizer.size(pair.address, &snap, &[addr(1)]).await.unwrap();

        assert_eq!(sized[0].collateral_amount, u(2_000));
        assert_eq!(sized[0].coverage_percent, 50.0);
    }

    #[tokio::test]
    async fn test_snapshot_projects_to_block_timestamp() {
        let mut pair = MockPair::new(addr(0x10));
        pair.total_borrow = Rebase::new(u(1_000_000), u(1_000_000));
        pair.accrue_info = AccrueInfo {
            interest_per_second: 1_000_000_000,
            last_accrued: 0,
            fees_earned_fraction: 0,
        };
        let protocol = Arc::new(MockProtocol::new());
        protocol.add_pair(pair.clone());

        let sizer = LiquidationSizer::new(protocol.clone(), 2);
        let block = BlockRef {
            number: 5,
            timestamp: 1_000_000_000,
        };
        let snap = sizer
            .snapshot(&pair.to_pair(), block, pair.total_borrow)
            .await
            .unwrap();

        assert_eq!(snap.projected_borrow.elastic, u(2_000_000));
        assert_eq!(snap.total_borrow.elastic, u(1_000_000));
    }
}
