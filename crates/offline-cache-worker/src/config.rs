//! Worker configuration: the cache generation name and the pre-cache list

use serde::{Deserialize, Serialize};

/// Version string of the current cache generation
pub const DEFAULT_CACHE_NAME: &str = "corecare-v1";

/// Page served to navigations when both network and cache miss
pub const DEFAULT_OFFLINE_URL: &str = "/portal/offline/";

/// Static assets pre-cached alongside the offline page
pub const DEFAULT_ASSETS: [&str; 3] = [
    "/static/manifest.json",
    "/static/images/icon-192.png",
    "/static/images/icon-512.png",
];

/// Configuration for one worker version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub cache_name: String,
    pub offline_url: String,
    /// Ordered pre-cache list; always starts with the offline page
    pub assets: Vec<String>,
}

impl WorkerConfig {
    /// A config whose pre-cache list holds only the offline page
    pub fn new(cache_name: impl Into<String>, offline_url: impl Into<String>) -> Self {
        let offline_url = offline_url.into();
        Self {
            cache_name: cache_name.into(),
            assets: vec![offline_url.clone()],
            offline_url,
        }
    }

    /// Append an asset; URLs already in the list are ignored
    pub fn with_asset(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !self.assets.contains(&url) {
            self.assets.push(url);
        }
        self
    }

    pub fn with_assets<I, U>(self, urls: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<String>,
    {
        urls.into_iter().fold(self, |config, url| config.with_asset(url))
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_NAME, DEFAULT_OFFLINE_URL).with_assets(DEFAULT_ASSETS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache_name, "corecare-v1");
        assert_eq!(config.offline_url, "/portal/offline/");
        assert_eq!(
            config.assets,
            vec![
                "/portal/offline/",
                "/static/manifest.json",
                "/static/images/icon-192.png",
                "/static/images/icon-512.png",
            ]
        );
    }

    #[test]
    fn test_offline_page_is_first_asset() {
        let config = WorkerConfig::new("corecare-v2", "/offline/");
        assert_eq!(config.assets, vec!["/offline/"]);
    }

    #[test]
    fn test_with_asset_skips_duplicates() {
        let config = WorkerConfig::new("corecare-v1", "/offline/")
            .with_assets(["/offline/", "/manifest.json", "/manifest.json"]);
        assert_eq!(config.assets, vec!["/offline/", "/manifest.json"]);
    }
}
