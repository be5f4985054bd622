//! Per-chain network configuration.
//!
//! One TOML file per chain under `config/networks/`. `${VAR}` placeholders
//! are expanded from the environment, then everything is resolved into an
//! immutable [`Network`].

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Default directory holding network files.
pub const DEFAULT_NETWORKS_DIR: &str = "config/networks";

/// Network file as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub network: NetworkDetails,
    pub rpc: RpcConfig,
    pub explorer: ExplorerConfig,
    pub contracts: ContractsConfig,
}

/// Network identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkDetails {
    /// Human-readable name
    pub name: String,
    /// Expected chain ID
    #[serde(default)]
    pub chain_id: Option<u64>,
}

/// JSON-RPC endpoint and its request budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub http: String,
    #[serde(default = "default_rpc_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_rpc_window_ms")]
    pub window_ms: u64,
}

fn default_rpc_max_requests() -> u32 {
    300
}
fn default_rpc_window_ms() -> u64 {
    1000
}

/// Etherscan-compatible explorer endpoint and its request budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Base URL; `/api` is appended
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_explorer_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_explorer_window_ms")]
    pub window_ms: u64,
}

fn default_explorer_max_requests() -> u32 {
    4
}
fn default_explorer_window_ms() -> u64 {
    1100
}

/// Protocol contract addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// BentoBox vault
    pub bento_box: String,
    /// Kashi master contract every pair is cloned from
    pub kashi_master: String,
    /// Swapper passed to real liquidations (zero address when absent)
    #[serde(default)]
    pub swapper: Option<String>,
    /// First block to scan for deployments
    #[serde(default)]
    pub start_block: u64,
}

/// Requests admitted per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

/// Resolved, immutable network descriptor.
#[derive(Debug, Clone)]
pub struct Network {
    pub name: String,
    pub chain_id: Option<u64>,
    pub rpc_url: String,
    pub rpc_rate: RateLimit,
    pub explorer_url: String,
    pub explorer_api_key: Option<String>,
    pub explorer_rate: RateLimit,
    pub bento_box: Address,
    pub kashi_master: Address,
    pub swapper: Address,
    pub start_block: u64,
}

impl NetworkConfig {
    /// Parse a network file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read network config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse network config: {}", path.display()))
    }

    /// Expand placeholders and parse addresses.
    pub fn resolve(&self) -> Result<Network> {
        let name = self.network.name.clone();

        let rpc_url = expand_env(&self.rpc.http);
        if let Some(var) = unresolved_var(&rpc_url) {
            bail!("{}: RPC URL needs environment variable {}", name, var);
        }

        let explorer_url = expand_env(&self.explorer.api_url);
        if let Some(var) = unresolved_var(&explorer_url) {
            bail!("{}: explorer URL needs environment variable {}", name, var);
        }

        let explorer_api_key = self
            .explorer
            .api_key
            .as_deref()
            .map(expand_env)
            .filter(|key| match unresolved_var(key) {
                Some(var) => {
                    warn!(network = %name, var = %var, "Explorer API key not set, using anonymous access");
                    false
                }
                None => !key.is_empty(),
            });

        let bento_box = parse_address(&self.contracts.bento_box)
            .with_context(|| format!("{}: invalid bento_box address", name))?;
        let kashi_master = parse_address(&self.contracts.kashi_master)
            .with_context(|| format!("{}: invalid kashi_master address", name))?;
        let swapper = match self.contracts.swapper.as_deref() {
            Some(s) if !s.is_empty() => {
                parse_address(s).with_context(|| format!("{}: invalid swapper address", name))?
            }
            _ => Address::ZERO,
        };

        Ok(Network {
            name,
            chain_id: self.network.chain_id,
            rpc_url,
            rpc_rate: RateLimit {
                max_requests: self.rpc.max_requests,
                window: Duration::from_millis(self.rpc.window_ms),
            },
            explorer_url,
            explorer_api_key,
            explorer_rate: RateLimit {
                max_requests: self.explorer.max_requests,
                window: Duration::from_millis(self.explorer.window_ms),
            },
            bento_box,
            kashi_master,
            swapper,
            start_block: self.contracts.start_block,
        })
    }
}

/// Load every network file in `dir`, optionally restricted to `selected`
/// (matched case-insensitively against file stem or network name).
pub fn load_networks(dir: &Path, selected: Option<&[String]>) -> Result<Vec<Network>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read networks directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();

    let mut networks = Vec::new();
    for path in files {
        let config = NetworkConfig::from_file(&path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if let Some(selected) = selected {
            let wanted = selected.iter().any(|s| {
                s.eq_ignore_ascii_case(&stem) || s.eq_ignore_ascii_case(&config.network.name)
            });
            if !wanted {
                continue;
            }
        }

        let network = config.resolve()?;
        info!(
            network = %network.name,
            bento_box = %network.bento_box,
            kashi_master = %network.kashi_master,
            "Loaded network"
        );
        networks.push(network);
    }

    if let Some(selected) = selected {
        for name in selected {
            let found = networks.iter().any(|n| n.name.eq_ignore_ascii_case(name))
                || dir.join(format!("{}.toml", name.to_lowercase())).exists();
            if !found {
                bail!("Unknown network '{}' (no file in {})", name, dir.display());
            }
        }
    }

    Ok(networks)
}

/// Load networks using `NETWORKS_DIR` and `NETWORKS` (comma separated).
pub fn load_networks_from_env() -> Result<Vec<Network>> {
    let dir = std::env::var("NETWORKS_DIR").unwrap_or_else(|_| DEFAULT_NETWORKS_DIR.to_string());
    let selected: Option<Vec<String>> = std::env::var("NETWORKS").ok().map(|s| {
        s.split(',')
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    });
    load_networks(Path::new(&dir), selected.as_deref().filter(|s| !s.is_empty()))
}

fn parse_address(s: &str) -> Result<Address> {
    s.trim()
        .parse()
        .with_context(|| format!("not an address: {}", s))
}

fn placeholder() -> Option<&'static regex_lite::Regex> {
    static RE: OnceLock<Option<regex_lite::Regex>> = OnceLock::new();
    RE.get_or_init(|| regex_lite::Regex::new(r"\$\{([^}]+)\}").ok())
        .as_ref()
}

/// Expand ${VAR_NAME} patterns with environment variable values.
/// Unset variables are left in place.
pub fn expand_env(s: &str) -> String {
    let Some(re) = placeholder() else {
        return s.to_string();
    };
    re.replace_all(s, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

/// First placeholder left unexpanded in `s`.
fn unresolved_var(s: &str) -> Option<String> {
    placeholder()?.captures(s).map(|caps| caps[1].to_string())
}
