//! Offline Cache Proxy - offline-first reverse proxy
//!
//! Hosts the offline cache worker in front of an origin server: assets are
//! pre-cached at start-up, requests go to the origin first, and cached
//! content (or the offline page) is served when the origin is unreachable.

mod config;
mod error;
mod server;
mod startup;
mod types;

use crate::config::ProxyConfig;
use crate::error::Result;
use crate::server::{start_server, ServerState, SharedState};
use offline_cache_worker::{CacheStorage, FileCacheStorage, HttpNetwork, Network, Registration};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("offline_cache_proxy=info".parse()?)
        .add_directive("offline_cache_worker=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting offline cache proxy...");

    let config = ProxyConfig::from_env()?;
    info!("Port: {}", config.port);
    info!("Origin: {}", config.origin_url);
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Cache name: {}", config.worker.cache_name);
    info!("Pre-cache assets: {}", config.worker.assets.join(", "));

    let storage = FileCacheStorage::new(config.cache_dir.clone());
    storage.init().await?;
    let storage: Arc<dyn CacheStorage> = Arc::new(storage);
    let network: Arc<dyn Network> =
        Arc::new(HttpNetwork::new(config.origin_url.clone(), config.upstream_timeout)?);

    let state: SharedState = Arc::new(ServerState::new(
        Registration::new(storage, network),
        config.worker.cache_name.clone(),
    ));

    // Keep serving the version left active by the previous run while the
    // configured one is installed.
    startup::bring_up(
        &state.registration,
        &config.worker,
        &startup::active_record_path(&config.cache_dir),
    )
    .await?;

    // Start HTTP server (blocking)
    start_server(state, config.port).await?;

    Ok(())
}
