//! Contract bindings for Kashi lending pairs and the BentoBox vault.
//!
//! Only the subset of each ABI the liquidator reads or calls is bound here.

use alloy::primitives::{Address, B256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};

sol! {
    /// Kashi lending pair (a BentoBox clone of the Kashi master contract)
    #[sol(rpc)]
    interface IKashiPair {
        function exchangeRate() external view returns (uint256);
        function totalBorrow() external view returns (uint128 elastic, uint128 base);
        function accrueInfo() external view returns (uint64 interestPerSecond, uint64 lastAccrued, uint128 feesEarnedFraction);
        function userCollateralShare(address user) external view returns (uint256);
        function userBorrowPart(address user) external view returns (uint256);

        /// Accrues and refreshes the oracle rate used by the next liquidation.
        function updateExchangeRate() external returns (bool updated, uint256 rate);

        function liquidate(
            address[] calldata users,
            uint256[] calldata maxBorrowParts,
            address to,
            address swapper,
            bool open
        ) external;

        event LogBorrow(address indexed from, address indexed to, uint256 amount, uint256 feeAmount, uint256 part);
    }
}

sol! {
    /// BentoBox vault (subset)
    #[sol(rpc)]
    interface IBentoBox {
        function totals(address token) external view returns (uint128 elastic, uint128 base);

        event LogDeploy(address indexed masterContract, bytes data, address indexed cloneAddress);
    }
}

sol! {
    /// ERC20 metadata
    #[sol(rpc)]
    interface IERC20 {
        function symbol() external view returns (string);
    }
}

/// Recipient used by solvency probes; never receives anything since the
/// probe is a reverting simulation.
pub const PROBE_RECIPIENT: Address = Address::with_last_byte(1);

/// Selector of `liquidate(address[],uint256[],address,address,bool)`.
pub const LIQUIDATE_SELECTOR: [u8; 4] = IKashiPair::liquidateCall::SELECTOR;

/// Event signatures used for log queries.
pub mod event_signatures {
    use super::*;

    /// `LogDeploy(address,bytes,address)` on the BentoBox
    pub const LOG_DEPLOY: B256 = IBentoBox::LogDeploy::SIGNATURE_HASH;

    /// `LogBorrow(address,address,uint256,uint256,uint256)` on a pair
    pub const LOG_BORROW: B256 = IKashiPair::LogBorrow::SIGNATURE_HASH;
}
