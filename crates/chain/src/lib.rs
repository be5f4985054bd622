//! Kashi liquidator chain interaction layer.
//!
//! This crate provides:
//! - Contract bindings for Kashi pairs, the BentoBox vault and ERC20 metadata
//! - Throttled RPC provider management
//! - The `KashiProtocol` trait and its JSON-RPC implementation
//! - BentoBox deployment / Kashi borrow log decoding
//! - Transaction signing and sending
//! - Token symbol caching

mod contracts;
mod error;
pub mod protocol;
mod provider;
mod signer;
mod symbols;

pub use contracts::{event_signatures, IBentoBox, IKashiPair, LIQUIDATE_SELECTOR, PROBE_RECIPIENT};
pub use error::ChainError;
pub use protocol::{
    decode_borrower, decode_deploy_log, AccrueInfo, BlockRef, BorrowerPosition, DeployedPair,
    KashiProtocol, KashiRpcProtocol, LiquidationRequest, Rebase, SimulationOutcome,
};
pub use provider::ProviderManager;
pub use signer::{
    TransactionSender, TransactionSenderBuilder, DEFAULT_LIQUIDATION_GAS_LIMIT, DEFAULT_RECEIPT_TIMEOUT,
};
pub use symbols::SymbolCache;
