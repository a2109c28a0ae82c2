//! The offline cache worker: install, activate and fetch handlers

use crate::config::WorkerConfig;
use crate::error::{OfflineCacheError, Result};
use crate::lifecycle::{is_valid_transition, WorkerState};
use crate::network::Network;
use crate::storage::CacheStorage;
use crate::types::{cache_key, FetchRequest, FetchResponse};
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Result of a successful install
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub cache_name: String,
    /// Request identities stored, in pre-cache order
    pub stored: Vec<String>,
}

/// Result of a successful activation
#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
    pub cache_name: String,
    pub deleted: Vec<String>,
}

/// What the fetch handler decided for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the host applies default network handling
    Passthrough,
    /// Live network response
    Network(FetchResponse),
    /// Network failed; identity-matching cached entry
    Cache(FetchResponse),
    /// Network failed on a navigation with no cached entry
    OfflinePage(FetchResponse),
    /// Network failed and nothing usable is cached
    NoResponse,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&FetchResponse> {
        match self {
            Self::Network(r) | Self::Cache(r) | Self::OfflinePage(r) => Some(r),
            Self::Passthrough | Self::NoResponse => None,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::Network(_) => "network",
            Self::Cache(_) => "cache",
            Self::OfflinePage(_) => "offline",
            Self::NoResponse => "none",
        }
    }
}

/// One version of the offline cache worker.
///
/// The handlers only do the work of each phase; the lifecycle state is
/// advanced by whoever dispatches them (see [`crate::Registration`]).
pub struct OfflineWorker<S: ?Sized, N: ?Sized> {
    config: WorkerConfig,
    storage: Arc<S>,
    network: Arc<N>,
    state: RwLock<WorkerState>,
}

impl<S, N> OfflineWorker<S, N>
where
    S: CacheStorage + ?Sized,
    N: Network + ?Sized,
{
    pub fn new(config: WorkerConfig, storage: Arc<S>, network: Arc<N>) -> Self {
        Self {
            config,
            storage,
            network,
            state: RwLock::new(WorkerState::Parsed),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Advance the lifecycle state, rejecting illegal steps
    pub async fn transition(&self, to: WorkerState) -> Result<()> {
        let mut state = self.state.write().await;
        let from = *state;
        if !is_valid_transition(from, to) {
            return Err(OfflineCacheError::InvalidTransition { from, to });
        }
        debug!(cache_name = %self.config.cache_name, %from, %to, "Worker state change");
        *state = to;
        Ok(())
    }

    /// Pre-cache every configured asset into the current generation.
    ///
    /// Assets are fetched concurrently. Any network failure or non-2xx
    /// response fails the whole install and nothing is stored. A generation
    /// created by a failed install is removed again.
    pub async fn install(&self) -> Result<InstallReport> {
        let cache_name = &self.config.cache_name;
        let assets = &self.config.assets;

        let mut seen = HashSet::new();
        if let Some(duplicate) = assets.iter().find(|url| !seen.insert(cache_key(url))) {
            return Err(OfflineCacheError::DuplicateAsset(duplicate.clone()));
        }

        let existed = self.storage.keys().await?.iter().any(|name| name == cache_name);
        self.storage.open(cache_name).await?;

        match self.precache(cache_name, assets).await {
            Ok(stored) => {
                info!(cache_name = %cache_name, assets = stored.len(), "Pre-cached assets");
                Ok(InstallReport {
                    cache_name: cache_name.clone(),
                    stored,
                })
            }
            Err(e) => {
                if !existed {
                    if let Err(cleanup) = self.storage.delete(cache_name).await {
                        warn!(cache_name = %cache_name, error = %cleanup, "Failed to remove unfinished cache");
                    }
                }
                Err(e)
            }
        }
    }

    async fn precache(&self, cache_name: &str, assets: &[String]) -> Result<Vec<String>> {
        let responses = try_join_all(assets.iter().map(|url| self.fetch_asset(url))).await?;
        let stored: Vec<String> = assets.iter().map(|url| cache_key(url)).collect();
        let entries = stored.iter().cloned().zip(responses).collect();
        self.storage.put_all(cache_name, entries).await?;
        Ok(stored)
    }

    async fn fetch_asset(&self, url: &str) -> Result<FetchResponse> {
        let response = self.network.fetch(&FetchRequest::get(url)).await.map_err(|e| {
            warn!(url = %url, error = %e, "Failed to fetch asset for pre-cache");
            e
        })?;

        if !response.is_ok() {
            warn!(url = %url, status = response.status, "Asset returned error status");
            return Err(OfflineCacheError::BadStatus {
                url: url.to_string(),
                status: response.status,
            });
        }

        Ok(response)
    }

    /// Delete every generation other than the current one.
    ///
    /// All deletions run concurrently and are all attempted; if any fail,
    /// activation fails naming the generations that are still present.
    pub async fn activate(&self) -> Result<ActivateReport> {
        let cache_name = &self.config.cache_name;
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != cache_name)
            .collect();

        let results = join_all(stale.iter().map(|name| self.storage.delete(name))).await;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => deleted.push(name),
                Err(e) => {
                    warn!(cache_name = %name, error = %e, "Failed to delete stale cache");
                    failed.push(name);
                }
            }
        }

        if !failed.is_empty() {
            return Err(OfflineCacheError::StaleCaches(failed));
        }

        info!(cache_name = %cache_name, deleted = deleted.len(), "Pruned stale caches");
        Ok(ActivateReport {
            cache_name: cache_name.clone(),
            deleted,
        })
    }

    /// Network first, falling back to the cache and then to the offline
    /// page for navigations. Only GET requests are intercepted and nothing
    /// is written to the cache.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        if !request.is_get() {
            return FetchOutcome::Passthrough;
        }

        match self.network.fetch(request).await {
            Ok(response) => return FetchOutcome::Network(response),
            Err(e) => debug!(url = %request.url, error = %e, "Network failed, trying cache"),
        }

        match self.storage.match_any(&request.cache_key()).await {
            Ok(Some(response)) => return FetchOutcome::Cache(response),
            Ok(None) => {}
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed");
                return FetchOutcome::NoResponse;
            }
        }

        if request.is_navigation() {
            match self.storage.match_any(&cache_key(&self.config.offline_url)).await {
                Ok(Some(page)) => return FetchOutcome::OfflinePage(page),
                Ok(None) => warn!(
                    offline_url = %self.config.offline_url,
                    "Offline page missing from cache"
                ),
                Err(e) => warn!(error = %e, "Offline page lookup failed"),
            }
        }

        FetchOutcome::NoResponse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCacheStorage;
    use crate::test_support::{FlakyStorage, ScriptedNetwork};
    use reqwest::Method;

    const ASSETS: [&str; 3] = ["/manifest.json", "/icon-192.png", "/icon-512.png"];

    fn scenario_config() -> WorkerConfig {
        WorkerConfig::new("corecare-v1", "/offline/").with_assets(ASSETS)
    }

    fn scenario_network() -> ScriptedNetwork {
        ScriptedNetwork::new()
            .with_route("/offline/", "<h1>You are offline</h1>")
            .with_route("/manifest.json", "{\"name\":\"CoreCare\"}")
            .with_route("/icon-192.png", "png-192")
            .with_route("/icon-512.png", "png-512")
    }

    fn worker_with(
        storage: Arc<MemoryCacheStorage>,
        network: Arc<ScriptedNetwork>,
    ) -> OfflineWorker<MemoryCacheStorage, ScriptedNetwork> {
        OfflineWorker::new(scenario_config(), storage, network)
    }

    #[tokio::test]
    async fn test_install_stores_every_asset() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let worker = worker_with(storage.clone(), Arc::new(scenario_network()));

        let report = worker.install().await.unwrap();
        assert_eq!(report.cache_name, "corecare-v1");
        assert_eq!(
            report.stored,
            vec!["/offline/", "/manifest.json", "/icon-192.png", "/icon-512.png"]
        );

        assert_eq!(
            storage.entry_keys("corecare-v1").await.unwrap(),
            vec!["/icon-192.png", "/icon-512.png", "/manifest.json", "/offline/"]
        );
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = scenario_network();
        network.fail_url("/icon-512.png");
        let worker = worker_with(storage.clone(), Arc::new(network));

        assert!(worker.install().await.is_err());
        assert!(storage.entry_keys("corecare-v1").await.unwrap().is_empty());
        assert!(storage.keys().await.unwrap().is_empty());
        assert_eq!(storage.stats().await.writes, 0);
    }

    #[tokio::test]
    async fn test_failed_reinstall_keeps_existing_generation() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(scenario_network());
        let worker = worker_with(storage.clone(), network.clone());
        worker.install().await.unwrap();

        network.fail_url("/icon-192.png");
        let again = worker_with(storage.clone(), network);
        assert!(again.install().await.is_err());

        assert_eq!(storage.keys().await.unwrap(), vec!["corecare-v1"]);
        assert_eq!(storage.entry_keys("corecare-v1").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_install_rejects_error_status() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = scenario_network();
        network.set_route(FetchResponse::new("/manifest.json", 500));
        let worker = worker_with(storage.clone(), Arc::new(network));

        let err = worker.install().await.unwrap_err();
        assert!(matches!(
            err,
            OfflineCacheError::BadStatus { status: 500, .. }
        ));
        assert_eq!(storage.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_install_rejects_duplicate_assets() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(scenario_network());
        let mut config = scenario_config();
        config.assets.push("/manifest.json#dup".to_string());
        let worker = OfflineWorker::new(config, storage, network.clone());

        let err = worker.install().await.unwrap_err();
        assert!(matches!(err, OfflineCacheError::DuplicateAsset(_)));
        assert!(network.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_prefers_network_and_never_writes() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(scenario_network());
        let worker = worker_with(storage.clone(), network.clone());
        worker.install().await.unwrap();
        let writes = storage.stats().await.writes;

        network.set_route(FetchResponse::new("/manifest.json", 200).with_body("fresh"));
        let outcome = worker.fetch(&FetchRequest::get("/manifest.json")).await;
        assert_eq!(outcome.source(), "network");
        assert_eq!(outcome.response().unwrap().body, b"fresh");

        let uncached = worker.fetch(&FetchRequest::get("/portal/shifts/")).await;
        assert_eq!(uncached.response().unwrap().status, 404);

        assert_eq!(storage.stats().await.writes, writes);
        assert!(storage
            .match_any("/portal/shifts/")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_cache() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(scenario_network());
        let worker = worker_with(storage, network.clone());
        worker.install().await.unwrap();

        network.set_offline(true);
        let outcome = worker.fetch(&FetchRequest::get("/manifest.json")).await;
        assert_eq!(
            outcome,
            FetchOutcome::Cache(
                FetchResponse::new("/manifest.json", 200).with_body("{\"name\":\"CoreCare\"}")
            )
        );
    }

    #[tokio::test]
    async fn test_navigation_falls_back_to_offline_page() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(scenario_network());
        let worker = worker_with(storage, network.clone());
        worker.install().await.unwrap();

        network.set_offline(true);
        let outcome = worker.fetch(&FetchRequest::navigate("/portal/schedule/")).await;
        match outcome {
            FetchOutcome::OfflinePage(page) => {
                assert_eq!(page.body, b"<h1>You are offline</h1>")
            }
            other => panic!("expected offline page, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subresource_miss_yields_no_response() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(scenario_network());
        let worker = worker_with(storage, network.clone());
        worker.install().await.unwrap();

        network.set_offline(true);
        let outcome = worker.fetch(&FetchRequest::get("/static/app.css")).await;
        assert_eq!(outcome, FetchOutcome::NoResponse);
        assert!(outcome.response().is_none());
    }

    #[tokio::test]
    async fn test_navigation_without_offline_page_yields_no_response() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(scenario_network());
        network.set_offline(true);
        let worker = worker_with(storage, network);

        let outcome = worker.fetch(&FetchRequest::navigate("/portal/")).await;
        assert_eq!(outcome, FetchOutcome::NoResponse);
    }

    #[tokio::test]
    async fn test_non_get_is_not_intercepted() {
        let network = Arc::new(scenario_network());
        let worker = worker_with(Arc::new(MemoryCacheStorage::new()), network.clone());

        for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
            let outcome = worker
                .fetch(&FetchRequest::new(method, "/manifest.json"))
                .await;
            assert_eq!(outcome, FetchOutcome::Passthrough);
        }
        assert!(network.calls().is_empty());
    }

    #[tokio::test]
    async fn test_activate_keeps_only_current_generation() {
        let storage = Arc::new(MemoryCacheStorage::new());
        for name in ["corecare-v0", "legacy-assets", "corecare-beta"] {
            storage.open(name).await.unwrap();
        }
        let worker = worker_with(storage.clone(), Arc::new(scenario_network()));
        worker.install().await.unwrap();

        let report = worker.activate().await.unwrap();
        assert_eq!(report.deleted.len(), 3);
        assert_eq!(storage.keys().await.unwrap(), vec!["corecare-v1"]);
    }

    #[tokio::test]
    async fn test_activate_with_nothing_stale() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let worker = worker_with(storage.clone(), Arc::new(scenario_network()));
        worker.install().await.unwrap();

        let report = worker.activate().await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(storage.keys().await.unwrap(), vec!["corecare-v1"]);
    }

    #[tokio::test]
    async fn test_activate_reports_failed_deletions() {
        let storage = Arc::new(FlakyStorage::failing_deletes_for(&["locked-v0"]));
        for name in ["locked-v0", "corecare-v0"] {
            storage.open(name).await.unwrap();
        }
        let worker = OfflineWorker::new(
            scenario_config(),
            storage.clone(),
            Arc::new(scenario_network()),
        );
        worker.install().await.unwrap();

        let err = worker.activate().await.unwrap_err();
        match err {
            OfflineCacheError::StaleCaches(names) => assert_eq!(names, vec!["locked-v0"]),
            other => panic!("unexpected error: {}", other),
        }
        // The other stale generation was still removed.
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["locked-v0", "corecare-v1"]
        );
    }

    #[tokio::test]
    async fn test_transition_rejects_illegal_step() {
        let worker = worker_with(
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(scenario_network()),
        );
        assert_eq!(worker.state().await, WorkerState::Parsed);

        let err = worker.transition(WorkerState::Activated).await.unwrap_err();
        assert!(matches!(err, OfflineCacheError::InvalidTransition { .. }));

        worker.transition(WorkerState::Installing).await.unwrap();
        assert_eq!(worker.state().await, WorkerState::Installing);
    }
}
