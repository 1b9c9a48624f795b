use std::sync::Arc;
use tracing::info;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod publisher;
mod server;
mod store;

use config::RelayerConfig;
use server::RelayerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relayer=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Ghostpool Relayer");

    dotenvy::dotenv().ok();
    let config = RelayerConfig::from_env()?;

    info!("Listening on: {}:{}", config.host, config.port);
    info!("Asset: {}", hex::encode(config.asset_id));
    info!("Root submitter: {}", config.relayer);

    let state = Arc::new(RelayerState::new(config)?);

    let publish_state = state.clone();
    let interval_secs = publish_state.config.publish_interval_secs;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            match publish_state.publisher.publish() {
                Ok(Some(root)) => info!("✓ Published root {}", hex::encode(root)),
                Ok(None) => {}
                Err(e) => warn!("✗ Root publication failed: {}", e),
            }
        }
    });

    server::run(state).await?;
    Ok(())
}
