//! Synth devnet - local multi-chain run of the cross-chain orchestration core
//!
//! Builds every configured chain, submits the configured requests and relays
//! messages between the chains until none are left in flight.

use anyhow::Result;
use tokio::signal;
use tracing::{debug, error, info, warn};

use synth_crosschain::config::Settings;
use synth_crosschain::devnet::Devnet;
use synth_crosschain::metrics;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting synth devnet v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains, {} scenarios",
        settings.chains.len(),
        settings.scenarios.len()
    );

    let devnet = Devnet::build(&settings)?;
    info!("Devnet initialized, hub chain {}", settings.hub_chain_id);

    for (name, result) in devnet.run_scenarios().await {
        if let Err(e) = result {
            error!("Scenario {} failed: {}", name, e);
        }
    }

    tokio::select! {
        result = devnet.engine.run_until_idle() => {
            match result {
                Ok(stats) => info!("Relay finished after {} rounds", stats.rounds),
                Err(e) => error!("Relay error: {}", e),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping...");
            devnet.engine.stop().await;
        }
    }

    for chain_id in devnet.engine.chain_ids() {
        let handle = devnet.engine.chain(chain_id)?;
        let chain = handle.lock().await;
        let stats = chain.ledger().stats();
        info!(
            "Chain {}: {} requests created, {} pending, {} finished",
            chain_id, stats.created, stats.pending, stats.finished
        );

        for event in chain.events() {
            match serde_json::to_string(event) {
                Ok(line) => debug!("Chain {} event: {}", chain_id, line),
                Err(e) => warn!("Failed to encode {} event: {}", event.name(), e),
            }
        }

        for key in chain.env().cached_keys() {
            warn!(
                "Chain {}: message {} from chain {} waiting for retry",
                chain_id, key.nonce, key.src_chain_id
            );
        }
    }

    debug!("Metrics:\n{}", metrics::gather_text());

    info!("Synth devnet stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,synth_crosschain=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
