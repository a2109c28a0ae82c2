//! Host-side lifecycle dispatch for the offline cache worker
//!
//! A [`Registration`] owns the shared cache store and network, keeps track
//! of the active and waiting worker versions, and drives each version
//! through install and activate. Fetches are routed to whichever version is
//! active at the time.

use crate::config::WorkerConfig;
use crate::error::{OfflineCacheError, Result};
use crate::lifecycle::WorkerState;
use crate::network::Network;
use crate::storage::CacheStorage;
use crate::types::{cache_key, FetchRequest};
use crate::worker::{ActivateReport, FetchOutcome, InstallReport, OfflineWorker};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

type SharedWorker<S, N> = Arc<OfflineWorker<S, N>>;

/// Version and state of one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub cache_name: String,
    pub state: WorkerState,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrationStatus {
    pub active: Option<WorkerStatus>,
    pub waiting: Option<WorkerStatus>,
}

pub struct Registration<S: ?Sized, N: ?Sized> {
    storage: Arc<S>,
    network: Arc<N>,
    active: RwLock<Option<SharedWorker<S, N>>>,
    waiting: RwLock<Option<SharedWorker<S, N>>>,
    /// Serializes install and activate; fetches do not take it
    lifecycle: Mutex<()>,
}

impl<S, N> Registration<S, N>
where
    S: CacheStorage + ?Sized,
    N: Network + ?Sized,
{
    pub fn new(storage: Arc<S>, network: Arc<N>) -> Self {
        Self {
            storage,
            network,
            active: RwLock::new(None),
            waiting: RwLock::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn network(&self) -> &Arc<N> {
        &self.network
    }

    /// Install a new worker version and activate it straight away.
    ///
    /// If install fails the previously active version keeps serving.
    pub async fn register(&self, config: WorkerConfig) -> Result<ActivateReport> {
        let _guard = self.lifecycle.lock().await;
        self.install_locked(config).await?;
        self.activate_locked().await
    }

    /// Install a new worker version and leave it waiting
    pub async fn install(&self, config: WorkerConfig) -> Result<InstallReport> {
        let _guard = self.lifecycle.lock().await;
        self.install_locked(config).await
    }

    /// Activate the waiting worker, replacing the active one
    pub async fn activate_waiting(&self) -> Result<ActivateReport> {
        let _guard = self.lifecycle.lock().await;
        self.activate_locked().await
    }

    /// Reinstate a version whose generation is already complete in the
    /// store, as a host does for the worker that was active before a restart.
    ///
    /// Returns `false` and changes nothing when the generation is missing or
    /// lacks any configured asset.
    pub async fn restore(&self, config: WorkerConfig) -> Result<bool> {
        let _guard = self.lifecycle.lock().await;

        if !self.storage.keys().await?.contains(&config.cache_name) {
            return Ok(false);
        }
        let stored = self.storage.entry_keys(&config.cache_name).await?;
        if !config.assets.iter().all(|url| stored.contains(&cache_key(url))) {
            return Ok(false);
        }

        let worker = Arc::new(OfflineWorker::new(
            config,
            self.storage.clone(),
            self.network.clone(),
        ));
        for state in [
            WorkerState::Installing,
            WorkerState::Installed,
            WorkerState::Activating,
            WorkerState::Activated,
        ] {
            worker.transition(state).await?;
        }

        info!(cache_name = %worker.cache_name(), "Restored worker from existing cache");
        let replaced = self.active.write().await.replace(worker);
        if let Some(previous) = replaced {
            Self::retire(&previous).await;
        }
        Ok(true)
    }

    async fn install_locked(&self, config: WorkerConfig) -> Result<InstallReport> {
        let worker = Arc::new(OfflineWorker::new(
            config,
            self.storage.clone(),
            self.network.clone(),
        ));
        worker.transition(WorkerState::Installing).await?;

        match worker.install().await {
            Ok(report) => {
                worker.transition(WorkerState::Installed).await?;
                let replaced = self.waiting.write().await.replace(worker);
                if let Some(previous) = replaced {
                    Self::retire(&previous).await;
                }
                Ok(report)
            }
            Err(e) => {
                error!(cache_name = %worker.cache_name(), error = %e, "Worker install failed");
                worker.transition(WorkerState::Redundant).await?;
                Err(e)
            }
        }
    }

    async fn activate_locked(&self) -> Result<ActivateReport> {
        let worker = self
            .waiting
            .read()
            .await
            .clone()
            .ok_or(OfflineCacheError::NoWaitingWorker)?;
        worker.transition(WorkerState::Activating).await?;

        match worker.activate().await {
            Ok(report) => {
                worker.transition(WorkerState::Activated).await?;
                self.waiting.write().await.take();
                let replaced = self.active.write().await.replace(worker);
                if let Some(previous) = replaced {
                    Self::retire(&previous).await;
                }
                info!(cache_name = %report.cache_name, "Worker activated");
                Ok(report)
            }
            Err(e) => {
                error!(cache_name = %worker.cache_name(), error = %e, "Worker activation failed");
                worker.transition(WorkerState::Installed).await?;
                Err(e)
            }
        }
    }

    async fn retire(worker: &OfflineWorker<S, N>) {
        if let Err(e) = worker.transition(WorkerState::Redundant).await {
            warn!(cache_name = %worker.cache_name(), error = %e, "Could not retire worker");
        }
    }

    /// Dispatch a fetch to the active worker; with none active the request
    /// is not intercepted.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let active = self.active.read().await.clone();
        match active {
            Some(worker) => worker.fetch(request).await,
            None => FetchOutcome::Passthrough,
        }
    }

    pub async fn active_worker(&self) -> Option<SharedWorker<S, N>> {
        self.active.read().await.clone()
    }

    pub async fn status(&self) -> RegistrationStatus {
        let active = self.active.read().await.clone();
        let waiting = self.waiting.read().await.clone();

        RegistrationStatus {
            active: match active {
                Some(worker) => Some(Self::worker_status(&worker).await),
                None => None,
            },
            waiting: match waiting {
                Some(worker) => Some(Self::worker_status(&worker).await),
                None => None,
            },
        }
    }

    async fn worker_status(worker: &OfflineWorker<S, N>) -> WorkerStatus {
        WorkerStatus {
            cache_name: worker.cache_name().to_string(),
            state: worker.state().await,
        }
    }
}
