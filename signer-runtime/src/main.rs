mod chain;
mod config;
mod error;
mod gateway_client;
mod main_loop;
mod reconcile;
mod retry;
mod store;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use crate::chain::PlaceholderVoteHasher;
use crate::config::{Config, StateBackend};
use crate::gateway_client::GatewayClient;
use crate::main_loop::Scheduler;
use crate::reconcile::Reconciler;
use crate::store::{JsonFileStore, SledStore, StateStore};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("Starting reward signer");

    let config = Config::from_env()?;

    let store: Arc<dyn StateStore + Send + Sync> = match config.state_backend {
        StateBackend::File => Arc::new(JsonFileStore::new(&config.state_path)),
        StateBackend::Sled => Arc::new(SledStore::new(&config.state_path)?),
    };

    tracing::info!(
        "Using {} signing state at: {}",
        config.state_backend,
        config.state_path
    );

    let gateway = Arc::new(GatewayClient::new(
        config.gateway_url.clone(),
        config.rewards_url.clone(),
    )?);

    tracing::info!(
        "Gateway client initialized with URL: {} (rewards data: {})",
        config.gateway_url,
        config.rewards_url
    );

    let reconciler = Arc::new(
        Reconciler::new(
            gateway.clone(),
            config.reward_manager.clone(),
            gateway,
            Arc::new(PlaceholderVoteHasher),
            store,
        )
        .with_lookback(config.lookback),
    );

    tracing::info!("Watching reward manager at {}", config.reward_manager);

    let scheduler = Scheduler::new(config.interval, config.retry, move || {
        let reconciler = Arc::clone(&reconciler);
        async move { reconciler.run_attempt().await.map(|_| ()) }
    });

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler.run(cancel_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Received Ctrl-C, shutting down...");

    let _ = cancel_tx.send(true);
    scheduler_task.await.context("scheduler task failed")?;

    Ok(())
}
