//! Configuration for the Kashi liquidator.
//!
//! This module provides:
//! - Bot runtime configuration (profiles, probe, retry, pass scheduling, execution)
//! - Network configuration (RPC and explorer endpoints, contract addresses, rate limits)

mod bot;
mod network;

pub use bot::{
    BotConfig, LiquidationConfig, PassConfig, ProbeConfig, ProbeSenderMode, RetryConfig,
    SentinelMode,
};
pub use network::{
    expand_env, load_networks, load_networks_from_env, ContractsConfig, ExplorerConfig, Network,
    NetworkConfig, NetworkDetails, RateLimit, RpcConfig, DEFAULT_NETWORKS_DIR,
};
