//! RPC provider management.
//! Uses Alloy HTTP providers; every request is paced by the chain's RPC throttle.

use alloy::network::EthereumWallet;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::transports::http::reqwest::Url;
use kashi_api::Throttle;
use std::sync::Arc;
use tracing::info;

use crate::error::ChainError;

/// Hands out throttled HTTP providers for one chain.
#[derive(Debug, Clone)]
pub struct ProviderManager {
    /// RPC endpoint
    url: Url,
    /// Shared request budget for this endpoint
    throttle: Arc<Throttle>,
}

impl ProviderManager {
    /// Create a provider manager for `rpc_url`.
    pub fn new(rpc_url: &str, throttle: Arc<Throttle>) -> Result<Self, ChainError> {
        let url = rpc_url
            .parse::<Url>()
            .map_err(|e| ChainError::InvalidUrl(format!("{}: {}", rpc_url, e)))?;

        info!(
            host = url.host_str().unwrap_or_default(),
            max_requests = throttle.max_requests(),
            window_ms = throttle.window().as_millis() as u64,
            "Initializing provider manager"
        );

        Ok(Self { url, throttle })
    }

    /// Wait for a request slot, then return a provider.
    ///
    /// Call once per RPC request; a provider is cheap to build.
    pub async fn provider(&self) -> impl Provider {
        self.throttle.acquire().await;
        ProviderBuilder::new().on_http(self.url.clone())
    }

    /// Like [`provider`](Self::provider), with a wallet filler for signing.
    pub async fn signing_provider(&self, wallet: EthereumWallet) -> impl Provider {
        self.throttle.acquire().await;
        ProviderBuilder::new().wallet(wallet).on_http(self.url.clone())
    }

    /// Get chain ID.
    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let chain_id = self.provider().await.get_chain_id().await?;
        Ok(chain_id)
    }
}
