//! Decoding of BentoBox deployment and Kashi borrow logs.

use alloy::primitives::{Address, Bytes, B256};
use alloy::sol_types::{SolEvent, SolValue};

use crate::contracts::{event_signatures, IBentoBox};
use crate::error::ChainError;

/// A Kashi pair found through a BentoBox `LogDeploy` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedPair {
    /// Clone address (the pair itself)
    pub address: Address,
    pub master_contract: Address,
    pub collateral: Address,
    pub asset: Address,
    pub oracle: Address,
    pub oracle_data: Bytes,
}

/// Decode a `LogDeploy` log. `data` carries
/// `abi.encode(collateral, asset, oracle, oracleData)`.
pub fn decode_deploy_log(topics: &[B256], data: &[u8]) -> Result<DeployedPair, ChainError> {
    let event = IBentoBox::LogDeploy::decode_raw_log(topics.iter().copied(), data, true)
        .map_err(|e| ChainError::Decode(format!("LogDeploy: {}", e)))?;

    let (collateral, asset, oracle, oracle_data) =
        <(Address, Address, Address, Bytes)>::abi_decode_params(&event.data, true)
            .map_err(|e| ChainError::Decode(format!("LogDeploy init data: {}", e)))?;

    Ok(DeployedPair {
        address: event.cloneAddress,
        master_contract: event.masterContract,
        collateral,
        asset,
        oracle,
        oracle_data,
    })
}

/// Borrower (`from`, topic1) of a `LogBorrow` log.
pub fn decode_borrower(topics: &[B256]) -> Result<Address, ChainError> {
    match topics {
        [signature, from, ..] if *signature == event_signatures::LOG_BORROW => {
            Ok(Address::from_word(*from))
        }
        [_, _, ..] => Err(ChainError::Decode("not a LogBorrow log".to_string())),
        _ => Err(ChainError::Decode("LogBorrow: missing topics".to_string())),
    }
}
