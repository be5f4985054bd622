//! Etherscan-compatible block-explorer client for event logs and account
//! transaction history.
//!
//! Every request passes through the chain's explorer [`Throttle`] and is
//! retried on transport-level failures under a bounded [`RetryPolicy`].
//! "No records found" style answers are empty results, not failures.

use alloy::primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::ExplorerError;
use crate::retry::{retry, CancelToken, RetryError, RetryPolicy};
use crate::throttle::Throttle;

/// Maximum logs returned by one `getLogs` page.
const LOG_PAGE_LIMIT: usize = 1000;

/// Maximum transactions returned by one `txlist` page.
const TX_PAGE_LIMIT: usize = 10_000;

/// Explorer messages that mean "valid, but empty".
const EMPTY_RESULT_MESSAGES: [&str; 3] = [
    "No records found",
    "No transactions found",
    "No logs found",
];

/// Explorer result string returned when its own rate limit trips.
const RATE_LIMIT_RESULT: &str = "Max rate limit reached";

/// Filter for an event-log query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    /// Emitting contract
    pub address: Address,
    /// Event signature hash
    pub topic0: B256,
    /// First indexed argument filter
    pub topic1: Option<B256>,
    /// First block (inclusive)
    pub from_block: u64,
    /// Last block (inclusive), `None` for latest
    pub to_block: Option<u64>,
}

impl LogQuery {
    /// Query all logs of `topic0` emitted by `address`.
    pub fn new(address: Address, topic0: B256) -> Self {
        Self {
            address,
            topic0,
            topic1: None,
            from_block: 0,
            to_block: None,
        }
    }

    /// Filter on the first indexed argument.
    pub fn with_topic1(mut self, topic: B256) -> Self {
        self.topic1 = Some(topic);
        self
    }

    /// Restrict to a block range.
    pub fn with_range(mut self, from_block: u64, to_block: Option<u64>) -> Self {
        self.from_block = from_block;
        self.to_block = to_block;
        self
    }

    fn params(&self, from_block: u64) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("module", "logs".to_string()),
            ("action", "getLogs".to_string()),
            ("address", self.address.to_string()),
            ("fromBlock", from_block.to_string()),
            (
                "toBlock",
                self.to_block
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "latest".to_string()),
            ),
            ("topic0", self.topic0.to_string()),
        ];
        if let Some(topic1) = self.topic1 {
            params.push(("topic0_1_opr", "and".to_string()));
            params.push(("topic1", topic1.to_string()));
        }
        params
    }
}

/// Event log as returned by the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: B256,
    pub data: Bytes,
    pub topics: Vec<B256>,
    #[serde(rename = "blockNumber", deserialize_with = "deserialize_u64_flexible")]
    pub block_number: u64,
    #[serde(
        rename = "logIndex",
        default,
        deserialize_with = "deserialize_u64_flexible"
    )]
    pub log_index: u64,
}

/// Transaction sent to an address, as returned by `txlist`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddressTransaction {
    pub hash: B256,
    pub from: Address,
    /// Empty for contract creations
    #[serde(default, deserialize_with = "deserialize_optional_address")]
    pub to: Option<Address>,
    /// Hex calldata
    #[serde(default)]
    pub input: String,
    /// "0" for success, "1" for failure; absent on some explorers
    #[serde(rename = "isError", default)]
    pub is_error: Option<String>,
    #[serde(rename = "blockNumber", deserialize_with = "deserialize_u64_flexible")]
    pub block_number: u64,
}

impl AddressTransaction {
    /// Whether the transaction executed successfully.
    pub fn succeeded(&self) -> bool {
        matches!(self.is_error.as_deref(), None | Some("0"))
    }

    /// Whether the calldata starts with the given 4-byte selector.
    pub fn calls(&self, selector: [u8; 4]) -> bool {
        let expected = format!("0x{}", alloy::hex::encode(selector));
        self.input
            .get(..10)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(&expected))
    }
}

/// Source of historical logs and transactions for one chain.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// All logs matching `query`, oldest first, deduplicated.
    async fn fetch_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, ExplorerError>;

    /// Successful transactions sent to `address` from `from_block` on.
    async fn fetch_address_transactions(
        &self,
        address: Address,
        from_block: u64,
    ) -> Result<Vec<AddressTransaction>, ExplorerError>;
}

/// Generic explorer response envelope.
#[derive(Debug, Deserialize)]
pub struct ExplorerResponse {
    #[serde(default, deserialize_with = "deserialize_string_flexible")]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

impl ExplorerResponse {
    /// Decode the records carried by this response.
    pub fn into_records<T: DeserializeOwned>(self) -> Result<Vec<T>, ExplorerError> {
        if self.result.as_str() == Some(RATE_LIMIT_RESULT) {
            return Err(ExplorerError::RateLimited);
        }

        let empty_array = self.result.as_array().is_some_and(|a| a.is_empty());
        match self.status.as_str() {
            "1" => serde_json::from_value(self.result)
                .map_err(|e| ExplorerError::Decode(e.to_string())),
            "0" if empty_array || EMPTY_RESULT_MESSAGES.contains(&self.message.as_str()) => {
                Ok(Vec::new())
            }
            _ => Err(ExplorerError::Api {
                message: self.message,
                result: match self.result {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                },
            }),
        }
    }
}

/// Block-explorer HTTP client bound to one chain.
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    client: reqwest::Client,
    network: String,
    base_url: String,
    api_key: Option<String>,
    throttle: Arc<Throttle>,
    retry_policy: RetryPolicy,
    cancel: CancelToken,
}

impl ExplorerClient {
    /// Create a client for `base_url` (e.g. `https://api.etherscan.io`).
    pub fn new(
        network: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        throttle: Arc<Throttle>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            network: network.into(),
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            throttle,
            retry_policy: RetryPolicy::default(),
            cancel: CancelToken::never(),
        }
    }

    /// Set the retry policy for transient failures.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Abort pending retries when `cancel` fires.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Network this client serves.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Issue one API call, retrying transient failures.
    async fn request<T: DeserializeOwned>(
        &self,
        params: &[(&'static str, String)],
    ) -> Result<Vec<T>, ExplorerError> {
        retry(
            &self.retry_policy,
            &self.cancel,
            "explorer request",
            ExplorerError::is_transient,
            || self.request_once(params),
        )
        .await
        .map_err(|e| match e {
            RetryError::Permanent(e) => e,
            RetryError::Exhausted { attempts, last } => {
                ExplorerError::Abandoned(format!("{} attempts, last error: {}", attempts, last))
            }
            RetryError::Cancelled => ExplorerError::Abandoned("cancelled".to_string()),
        })
    }

    async fn request_once<T: DeserializeOwned>(
        &self,
        params: &[(&'static str, String)],
    ) -> Result<Vec<T>, ExplorerError> {
        self.throttle.acquire().await;

        let url = format!("{}/api", self.base_url.trim_end_matches('/'));
        let mut query: Vec<(&str, String)> = params.to_vec();
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.clone()));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ExplorerError::Http {
                status: status.as_u16(),
            });
        }

        let envelope: ExplorerResponse = response.json().await?;
        envelope.into_records()
    }

    /// Fetch all logs matching `query`, following pagination.
    #[instrument(skip(self, query), fields(network = %self.network, address = %query.address))]
    pub async fn get_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, ExplorerError> {
        let mut from_block = query.from_block;
        let mut seen = HashSet::new();
        let mut logs = Vec::new();

        loop {
            let page: Vec<LogEntry> = self.request(&query.params(from_block)).await?;
            let page_len = page.len();
            let last_block = page.last().map(|l| l.block_number);

            for entry in page {
                if seen.insert((entry.transaction_hash, entry.log_index)) {
                    logs.push(entry);
                }
            }

            match last_block {
                Some(last) if page_len >= LOG_PAGE_LIMIT && last > from_block => {
                    debug!(from_block = last, fetched = logs.len(), "Following log pagination");
                    from_block = last;
                }
                Some(last) if page_len >= LOG_PAGE_LIMIT => {
                    warn!(block = last, "Log page saturated by a single block, results may be truncated");
                    break;
                }
                _ => break,
            }
        }

        debug!(count = logs.len(), "Fetched logs");
        Ok(logs)
    }

    /// Fetch successful transactions sent to `address`, following pagination.
    #[instrument(skip(self), fields(network = %self.network))]
    pub async fn get_address_transactions(
        &self,
        address: Address,
        from_block: u64,
    ) -> Result<Vec<AddressTransaction>, ExplorerError> {
        let mut start_block = from_block;
        let mut seen = HashSet::new();
        let mut txs = Vec::new();

        loop {
            let params = vec![
                ("module", "account".to_string()),
                ("action", "txlist".to_string()),
                ("address", address.to_string()),
                ("startblock", start_block.to_string()),
                ("endblock", "latest".to_string()),
                ("sort", "asc".to_string()),
            ];
            let page: Vec<AddressTransaction> = self.request(&params).await?;
            let page_len = page.len();
            let last_block = page.last().map(|t| t.block_number);

            for tx in page {
                if seen.insert(tx.hash) {
                    txs.push(tx);
                }
            }

            match last_block {
                Some(last) if page_len >= TX_PAGE_LIMIT && last > start_block => start_block = last,
                _ => break,
            }
        }

        txs.retain(AddressTransaction::succeeded);
        debug!(count = txs.len(), "Fetched address transactions");
        Ok(txs)
    }
}

#[async_trait]
impl LogSource for ExplorerClient {
    async fn fetch_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, ExplorerError> {
        self.get_logs(query).await
    }

    async fn fetch_address_transactions(
        &self,
        address: Address,
        from_block: u64,
    ) -> Result<Vec<AddressTransaction>, ExplorerError> {
        self.get_address_transactions(address, from_block).await
    }
}

// Custom deserializers

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(u64),
}

/// Accepts `"0x1a"`, `"26"`, `"0x"` (zero) or a JSON number.
fn deserialize_u64_flexible<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Number(n) => Ok(n),
        StringOrNumber::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                if hex.is_empty() {
                    return Ok(0);
                }
                u64::from_str_radix(hex, 16).map_err(serde::de::Error::custom)
            } else if s.is_empty() {
                Ok(0)
            } else {
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    }
}

fn deserialize_string_flexible<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}

fn deserialize_optional_address<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
