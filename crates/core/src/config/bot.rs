//! Bot runtime configuration with profile support.
//!
//! Provides centralized configuration for probing, retries, pass scheduling
//! and liquidation submission, with profiles (default, observe, production).

use alloy::primitives::{Address, U256};
use anyhow::Context;
use kashi_api::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::solvency::{ProbeSender, SentinelPolicy, DEFAULT_SENTINEL};

/// Main configuration structure containing all bot parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Solvency probe settings
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Retry policy for explorer requests and probes
    #[serde(default)]
    pub retry: RetryConfig,

    /// Pass scheduling
    #[serde(default)]
    pub pass: PassConfig,

    /// Liquidation execution parameters
    #[serde(default)]
    pub liquidation: LiquidationConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Who the probe simulates `liquidate` from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeSenderMode {
    /// The pair's own address (Kashi gates on `msg.sender == address(this)`)
    Pair,
    /// `neutral_sender`
    Neutral,
}

/// How the probe's borrow part is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelMode {
    /// The pair's `totalBorrow.base` at the snapshot block
    TotalBorrowBase,
    /// `fixed_sentinel`, or 34444 when unset
    Fixed,
}

/// Solvency probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_sender_mode")]
    pub sender: ProbeSenderMode,

    /// Sender used in `neutral` mode
    #[serde(default)]
    pub neutral_sender: Option<String>,

    #[serde(default = "default_sentinel_mode")]
    pub sentinel: SentinelMode,

    /// Decimal or 0x-hex value used in `fixed` mode
    #[serde(default)]
    pub fixed_sentinel: Option<String>,

    /// Concurrent probes per pair
    #[serde(default = "default_probe_concurrency")]
    pub concurrency: usize,
}

fn default_sender_mode() -> ProbeSenderMode {
    ProbeSenderMode::Pair
}
fn default_sentinel_mode() -> SentinelMode {
    SentinelMode::Fixed
}
fn default_probe_concurrency() -> usize {
    16
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            sender: default_sender_mode(),
            neutral_sender: None,
            sentinel: default_sentinel_mode(),
            fixed_sentinel: None,
            concurrency: default_probe_concurrency(),
        }
    }
}

impl ProbeConfig {
    /// Resolve the configured sender.
    pub fn probe_sender(&self) -> anyhow::Result<ProbeSender> {
        match self.sender {
            ProbeSenderMode::Pair => Ok(ProbeSender::PairSelf),
            ProbeSenderMode::Neutral => {
                let address = match self.neutral_sender.as_deref() {
                    Some(s) => s
                        .trim()
                        .parse::<Address>()
                        .with_context(|| format!("invalid probe.neutral_sender: {}", s))?,
                    None => Address::ZERO,
                };
                Ok(ProbeSender::Neutral(address))
            }
        }
    }

    /// Resolve the configured sentinel policy.
    pub fn sentinel_policy(&self) -> anyhow::Result<SentinelPolicy> {
        match self.sentinel {
            SentinelMode::TotalBorrowBase => Ok(SentinelPolicy::TotalBorrowBase),
            SentinelMode::Fixed => {
                let value = match self.fixed_sentinel.as_deref() {
                    Some(raw) => raw
                        .trim()
                        .parse::<U256>()
                        .with_context(|| format!("invalid probe.fixed_sentinel: {}", raw))?,
                    None => U256::from(DEFAULT_SENTINEL),
                };
                anyhow::ensure!(!value.is_zero(), "probe.fixed_sentinel must be positive");
                Ok(SentinelPolicy::Fixed(value))
            }
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    30
}
fn default_base_delay() -> u64 {
    250
}
fn default_max_delay() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Pass scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// Pairs processed concurrently
    #[serde(default = "default_pair_concurrency")]
    pub pair_concurrency: usize,

    /// Borrowers sized concurrently per pair
    #[serde(default = "default_sizing_concurrency")]
    pub sizing_concurrency: usize,

    /// Upper bound for one network pass (seconds)
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,

    /// Delay between passes (seconds); 0 runs a single pass
    #[serde(default)]
    pub interval_secs: u64,

    /// Collect past liquidations for the statistics
    #[serde(default = "default_collect_history")]
    pub collect_history: bool,
}

fn default_pair_concurrency() -> usize {
    4
}
fn default_sizing_concurrency() -> usize {
    8
}
fn default_deadline() -> u64 {
    900
}
fn default_collect_history() -> bool {
    true
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            pair_concurrency: default_pair_concurrency(),
            sizing_concurrency: default_sizing_concurrency(),
            deadline_secs: default_deadline(),
            interval_secs: 0,
            collect_history: default_collect_history(),
        }
    }
}

impl PassConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// `None` for a single pass.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

/// Liquidation execution parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Submit transactions; when false every attempt is reported as skipped
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Cap on the share of a borrower's debt repaid in one call (percent)
    #[serde(default = "default_max_percent")]
    pub max_percent: u64,

    /// Recipient of seized collateral; defaults to the signer
    #[serde(default)]
    pub receiver: Option<String>,

    /// Fixed legacy gas price; the node's price is used when unset
    #[serde(default)]
    pub gas_price_gwei: Option<f64>,

    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    /// Receipt wait after broadcast before reporting a liquidation unconfirmed
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}
fn default_max_percent() -> u64 {
    50
}
fn default_gas_limit() -> u64 {
    kashi_chain::DEFAULT_LIQUIDATION_GAS_LIMIT
}
fn default_receipt_timeout() -> u64 {
    kashi_chain::DEFAULT_RECEIPT_TIMEOUT.as_secs()
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_percent: default_max_percent(),
            receiver: None,
            gas_price_gwei: None,
            gas_limit: default_gas_limit(),
            receipt_timeout_secs: default_receipt_timeout(),
        }
    }
}

impl LiquidationConfig {
    /// Gas price in wei, if fixed.
    pub fn gas_price_wei(&self) -> Option<u128> {
        self.gas_price_gwei
            .filter(|gwei| *gwei > 0.0)
            .map(|gwei| (gwei * 1e9) as u128)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn receiver_address(&self) -> anyhow::Result<Option<Address>> {
        self.receiver
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse::<Address>()
                    .with_context(|| format!("invalid liquidation.receiver: {}", s))
            })
            .transpose()
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            probe: ProbeConfig::default(),
            retry: RetryConfig::default(),
            pass: PassConfig::default(),
            liquidation: LiquidationConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bot config: {}", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse bot config: {}", path))?;
        Ok(config)
    }

    /// Read-only profile: discover, probe and size, never submit.
    pub fn observe() -> Self {
        Self {
            profile: "observe".to_string(),
            liquidation: LiquidationConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Continuous liquidation with wider concurrency.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            probe: ProbeConfig {
                concurrency: 32,
                ..Default::default()
            },
            retry: RetryConfig::default(),
            pass: PassConfig {
                pair_concurrency: 8,
                sizing_concurrency: 16,
                deadline_secs: 600,
                interval_secs: 60,
                collect_history: false,
            },
            liquidation: LiquidationConfig::default(),
        }
    }

    /// `BOT_CONFIG` file if set, else the `BOT_PROFILE` profile.
    /// Supported profiles: default, observe, production
    pub fn from_env() -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var("BOT_CONFIG") {
            return Self::from_file(&path);
        }
        let profile = std::env::var("BOT_PROFILE").unwrap_or_else(|_| "default".to_string());
        Ok(match profile.to_lowercase().as_str() {
            "observe" | "readonly" => Self::observe(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        })
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.probe.probe_sender()?;
        self.probe.sentinel_policy()?;
        self.liquidation.receiver_address()?;
        anyhow::ensure!(
            (1..=100).contains(&self.liquidation.max_percent),
            "liquidation.max_percent must be within 1..=100"
        );
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Bot configuration loaded");
        tracing::info!(
            sender = ?self.probe.sender,
            sentinel = ?self.probe.sentinel,
            concurrency = self.probe.concurrency,
            "Solvency probe"
        );
        tracing::info!(
            max_attempts = self.retry.max_attempts,
            base_delay_ms = self.retry.base_delay_ms,
            max_delay_ms = self.retry.max_delay_ms,
            "Retry policy"
        );
        tracing::info!(
            pair_concurrency = self.pass.pair_concurrency,
            sizing_concurrency = self.pass.sizing_concurrency,
            deadline_secs = self.pass.deadline_secs,
            interval_secs = self.pass.interval_secs,
            collect_history = self.pass.collect_history,
            "Pass scheduling"
        );
        tracing::info!(
            enabled = self.liquidation.enabled,
            max_percent = self.liquidation.max_percent,
            gas_price_gwei = ?self.liquidation.gas_price_gwei,
            gas_limit = self.liquidation.gas_limit,
            receipt_timeout_secs = self.liquidation.receipt_timeout_secs,
            "Liquidation parameters"
        );
    }
}
