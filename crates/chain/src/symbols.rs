//! Memoized ERC20 symbol lookups.

use alloy::primitives::Address;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::protocol::KashiProtocol;

/// Per-chain token symbol cache.
///
/// Symbols never change, so a successful lookup is cached for the life of
/// the process. Failed lookups fall back to the token address and are retried
/// on the next request.
#[derive(Debug, Default)]
pub struct SymbolCache {
    symbols: DashMap<Address, String>,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached symbol, if known.
    pub fn get(&self, token: Address) -> Option<String> {
        self.symbols.get(&token).map(|s| s.value().clone())
    }

    /// Symbol of `token`, fetched through `protocol` on first use.
    pub async fn get_or_fetch(&self, token: Address, protocol: &dyn KashiProtocol) -> String {
        if let Some(symbol) = self.get(token) {
            return symbol;
        }

        match protocol.token_symbol(token).await {
            Ok(symbol) => {
                debug!(token = %token, symbol = %symbol, "Cached token symbol");
                self.symbols.insert(token, symbol.clone());
                symbol
            }
            Err(e) => {
                warn!(token = %token, error = %e, "Symbol lookup failed, using address");
                token.to_string()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
