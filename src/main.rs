//! Kashi Liquidator
//!
//! Scans Kashi lending pairs on every configured network, finds insolvent
//! borrowers by simulating liquidations and submits partial liquidations.
//! Features:
//! - Pair and borrower discovery from block-explorer logs
//! - Solvency probing via simulated `liquidate` calls pinned to one block
//! - Coverage-based liquidation sizing
//! - Per-network JSON pass reports

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kashi_api::{CancelToken, Cancellation, ExplorerClient, Throttle};
use kashi_chain::{KashiRpcProtocol, ProviderManager, SymbolCache, TransactionSenderBuilder};
use kashi_core::{load_networks_from_env, BotConfig, LiquidationEngine, Network};

/// Environment variable names.
mod env {
    pub const LIQUIDATOR_PK: &str = "LIQUIDATOR_PK";
    pub const LIQUIDATION_RECEIVER: &str = "LIQUIDATION_RECEIVER";
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,kashi_core=debug,kashi_chain=debug")),
        )
        .init();

    // BOT_CONFIG file or BOT_PROFILE: default, observe, production
    let mut bot_config = BotConfig::from_env()?;
    if let Ok(receiver) = std::env::var(env::LIQUIDATION_RECEIVER) {
        bot_config.liquidation.receiver = Some(receiver);
    }
    bot_config.validate()?;
    bot_config.log_config();

    let networks = load_networks_from_env()?;
    anyhow::ensure!(!networks.is_empty(), "No networks configured");
    info!(
        networks = ?networks.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(),
        "Starting Kashi liquidator"
    );

    let cancellation = Arc::new(Cancellation::new());
    {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Shutdown requested, cancelling pending work");
                cancellation.cancel();
            }
        });
    }

    let private_key = std::env::var(env::LIQUIDATOR_PK).ok();
    let runs = networks.into_iter().map(|network| {
        run_network(
            network,
            bot_config.clone(),
            private_key.clone(),
            cancellation.token(),
        )
    });

    for (result, name) in futures::future::join_all(runs).await {
        if let Err(e) = result {
            error!(network = %name, error = %e, "Network stopped");
        }
    }

    info!("Kashi liquidator finished");
    Ok(())
}

/// Build the per-network stack and run passes until done or cancelled.
async fn run_network(
    network: Network,
    config: BotConfig,
    private_key: Option<String>,
    cancel: CancelToken,
) -> (Result<()>, String) {
    let name = network.name.clone();
    let result = run_network_inner(network, config, private_key, cancel).await;
    (result, name)
}

async fn run_network_inner(
    network: Network,
    config: BotConfig,
    private_key: Option<String>,
    cancel: CancelToken,
) -> Result<()> {
    let network = Arc::new(network);

    // One limiter per endpoint class
    let rpc_throttle = Arc::new(Throttle::new(
        format!("{} rpc", network.name),
        network.rpc_rate.max_requests,
        network.rpc_rate.window,
    ));
    let explorer_throttle = Arc::new(Throttle::new(
        format!("{} explorer", network.name),
        network.explorer_rate.max_requests,
        network.explorer_rate.window,
    ));

    let explorer = ExplorerClient::new(
        network.name.clone(),
        network.explorer_url.clone(),
        network.explorer_api_key.clone(),
        explorer_throttle,
    )
    .with_retry_policy(config.retry.policy())
    .with_cancel_token(cancel.clone());

    let provider = ProviderManager::new(&network.rpc_url, rpc_throttle)?;
    let mut protocol = KashiRpcProtocol::new(provider.clone(), network.bento_box);

    match (&private_key, config.liquidation.enabled) {
        (Some(key), true) => {
            let sender = TransactionSenderBuilder::new(provider)
                .gas_price_wei(config.liquidation.gas_price_wei())
                .gas_limit(config.liquidation.gas_limit)
                .receipt_timeout(config.liquidation.receipt_timeout())
                .build(key)
                .await
                .with_context(|| format!("{}: transaction sender", network.name))?;
            if let Some(chain_id) = network.chain_id {
                anyhow::ensure!(
                    chain_id == sender.chain_id(),
                    "{}: RPC reports chain {} but {} is configured",
                    network.name,
                    sender.chain_id(),
                    chain_id
                );
            }
            info!(network = %network.name, signer = %sender.address, "Liquidations enabled");
            if network.swapper.is_zero() {
                warn!(network = %network.name, "No swapper configured, liquidations will be skipped");
            }
            protocol = protocol.with_sender(Arc::new(sender));
        }
        (None, true) => {
            warn!(network = %network.name, "{} not set, running in observe mode", env::LIQUIDATOR_PK);
        }
        (_, false) => {
            info!(network = %network.name, "Liquidations disabled by configuration");
        }
    }

    let engine = LiquidationEngine::new(
        network.clone(),
        Arc::new(protocol),
        Arc::new(explorer),
        Arc::new(SymbolCache::new()),
        &config,
    )?
    .with_cancel_token(cancel.clone());

    loop {
        let report = engine.run_liquidation_pass().await;
        println!("{}", serde_json::to_string_pretty(&report)?);

        let Some(interval) = config.pass.interval() else {
            break;
        };
        if cancel.is_cancelled() {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    Ok(())
}
