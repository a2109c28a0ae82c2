//! Proxy configuration parsed from environment variables

use crate::error::{ProxyError, Result};
use offline_cache_worker::config::{DEFAULT_ASSETS, DEFAULT_CACHE_NAME, DEFAULT_OFFLINE_URL};
use offline_cache_worker::WorkerConfig;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DEFAULT_ORIGIN_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    /// Server the proxy treats as "the network"
    pub origin_url: Url,
    pub cache_dir: PathBuf,
    pub upstream_timeout: Duration,
    pub worker: WorkerConfig,
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = lookup("PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(3005);

        let origin = lookup("ORIGIN_URL").unwrap_or_else(|| DEFAULT_ORIGIN_URL.to_string());
        let origin_url = Url::parse(&origin)
            .map_err(|e| ProxyError::Config(format!("invalid ORIGIN_URL {}: {}", origin, e)))?;

        let cache_dir = lookup("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./cache/offline"));

        let upstream_timeout = lookup("UPSTREAM_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let cache_name = lookup("CACHE_NAME").unwrap_or_else(|| DEFAULT_CACHE_NAME.to_string());
        let offline_url = lookup("OFFLINE_URL").unwrap_or_else(|| DEFAULT_OFFLINE_URL.to_string());
        let assets: Vec<String> = match lookup("PRECACHE_ASSETS") {
            Some(list) => list
                .split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            None => DEFAULT_ASSETS.iter().map(|a| a.to_string()).collect(),
        };

        Ok(Self {
            port,
            origin_url,
            cache_dir,
            upstream_timeout,
            worker: WorkerConfig::new(cache_name, offline_url).with_assets(assets),
        })
    }
}
