//! Transaction signer and sender for liquidations.
//! Uses Alloy providers with a local private-key wallet and legacy gas pricing.
//!
//! The nonce is tracked locally so sequential submissions don't need an
//! RPC round trip each; it is resynced from the chain after any failure.
//! A nonce is only taken once the request slot is held, so a dropped
//! submission never leaves a gap.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::ChainError;
use crate::provider::ProviderManager;

/// Default gas limit for a single-borrower Kashi liquidation.
pub const DEFAULT_LIQUIDATION_GAS_LIMIT: u64 = 700_000;

/// Default wait for a receipt before reporting the transaction unconfirmed.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(180);

/// Cached nonce manager for sequential transaction submission.
pub struct NonceManager {
    /// Next nonce to use
    current: AtomicU64,
}

impl NonceManager {
    /// Create new nonce manager with initial value from chain.
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_nonce),
        }
    }

    /// Get next nonce and increment counter.
    #[inline]
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst)
    }

    /// Reset nonce to chain value (use after tx failure).
    pub fn reset(&self, chain_nonce: u64) {
        self.current.store(chain_nonce, Ordering::SeqCst);
    }
}

/// Builder for TransactionSender.
pub struct TransactionSenderBuilder {
    provider: ProviderManager,
    gas_price_wei: Option<u128>,
    gas_limit: Option<u64>,
    receipt_timeout: Duration,
}

impl TransactionSenderBuilder {
    /// Create a new builder submitting through `provider`.
    pub fn new(provider: ProviderManager) -> Self {
        Self {
            provider,
            gas_price_wei: None,
            gas_limit: None,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    /// Fixed legacy gas price; the node's `eth_gasPrice` is used when unset.
    pub fn gas_price_wei(mut self, price: Option<u128>) -> Self {
        self.gas_price_wei = price;
        self
    }

    /// Set a custom gas limit.
    pub fn gas_limit(mut self, limit: u64) -> Self {
        self.gas_limit = Some(limit);
        self
    }

    /// How long to wait for a receipt after broadcasting.
    pub fn receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    /// Build the TransactionSender.
    pub async fn build(self, private_key: &str) -> Result<TransactionSender, ChainError> {
        // Parse private key (with or without 0x prefix)
        let key_str = private_key.trim().trim_start_matches("0x");
        let signer = key_str
            .parse::<PrivateKeySigner>()
            .map_err(|e| ChainError::InvalidKey(e.to_string()))?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let chain_id = self.provider.chain_id().await?;
        let initial_nonce = self
            .provider
            .provider()
            .await
            .get_transaction_count(address)
            .await?;

        let gas_limit = self.gas_limit.unwrap_or(DEFAULT_LIQUIDATION_GAS_LIMIT);
        info!(
            address = %address,
            chain_id = chain_id,
            initial_nonce = initial_nonce,
            gas_limit = gas_limit,
            gas_price_wei = ?self.gas_price_wei,
            receipt_timeout_secs = self.receipt_timeout.as_secs(),
            "Transaction sender initialized"
        );

        Ok(TransactionSender {
            provider: self.provider,
            wallet,
            address,
            chain_id,
            nonce_manager: NonceManager::new(initial_nonce),
            gas_limit,
            gas_price_wei: self.gas_price_wei,
            receipt_timeout: self.receipt_timeout,
        })
    }
}

/// Signs and submits liquidation transactions for one chain.
pub struct TransactionSender {
    /// Throttled RPC access
    provider: ProviderManager,
    /// Signer wallet
    wallet: EthereumWallet,
    /// Signer address
    pub address: Address,
    /// Chain ID
    chain_id: u64,
    /// Cached nonce manager
    nonce_manager: NonceManager,
    /// Gas limit for every submission
    gas_limit: u64,
    /// Fixed legacy gas price, or `None` to ask the node
    gas_price_wei: Option<u128>,
    /// Receipt wait after broadcast
    receipt_timeout: Duration,
}

impl TransactionSender {
    /// Create a sender with default gas settings.
    pub async fn new(private_key: &str, provider: ProviderManager) -> Result<Self, ChainError> {
        TransactionSenderBuilder::new(provider)
            .build(private_key)
            .await
    }

    /// Send a transaction and wait for confirmation.
    ///
    /// Returns [`ChainError::Unconfirmed`] when the transaction was
    /// broadcast but no receipt arrived within the receipt timeout.
    pub async fn send_transaction(&self, to: Address, calldata: Bytes) -> Result<B256, ChainError> {
        let total_start = Instant::now();

        let gas_price = match self.gas_price_wei {
            Some(price) => price,
            None => self.provider.provider().await.get_gas_price().await?,
        };

        // Slot first, nonce second
        let provider = self.provider.signing_provider(self.wallet.clone()).await;
        let nonce = self.nonce_manager.next();

        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata)
            .with_nonce(nonce)
            .with_gas_limit(self.gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.chain_id);

        info!(
            to = %to,
            nonce = nonce,
            gas_limit = self.gas_limit,
            gas_price_gwei = gas_price as f64 / 1e9,
            "Sending transaction"
        );

        let pending = match provider.send_transaction(tx).await {
            Ok(pending) => pending,
            Err(e) => {
                self.sync_nonce().await;
                return Err(ChainError::Submission(e.to_string()));
            }
        };
        let tx_hash = *pending.tx_hash();
        debug!(tx_hash = %tx_hash, "Transaction submitted, waiting for confirmation");

        let receipt = match tokio::time::timeout(self.receipt_timeout, pending.get_receipt()).await {
            Ok(receipt) => {
                receipt.map_err(|e| ChainError::Submission(format!("{}: {}", tx_hash, e)))?
            }
            Err(_) => {
                warn!(
                    tx_hash = %tx_hash,
                    nonce = nonce,
                    waited_secs = self.receipt_timeout.as_secs(),
                    "No receipt yet, leaving transaction pending"
                );
                return Err(ChainError::Unconfirmed(tx_hash));
            }
        };

        if receipt.status() {
            info!(
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                gas_used = receipt.gas_used,
                total_ms = total_start.elapsed().as_millis() as u64,
                "Transaction confirmed"
            );
            Ok(tx_hash)
        } else {
            warn!(tx_hash = %tx_hash, "Transaction reverted, syncing nonce");
            self.sync_nonce().await;
            Err(ChainError::TransactionReverted(tx_hash))
        }
    }

    /// Sync nonce from chain (call on error).
    pub async fn sync_nonce(&self) {
        let provider = self.provider.provider().await;
        match provider.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                self.nonce_manager.reset(chain_nonce);
                debug!(nonce = chain_nonce, "Nonce synced from chain");
            }
            Err(e) => {
                warn!(error = %e, "Failed to sync nonce from chain");
            }
        }
    }

    /// Chain the sender signs for.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("gas_limit", &self.gas_limit)
            .field("receipt_timeout", &self.receipt_timeout)
            .finish_non_exhaustive()
    }
}
