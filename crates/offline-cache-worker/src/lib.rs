//! Offline Cache Worker
//!
//! A network-first request handler that pre-caches a fixed set of assets into
//! a versioned cache generation, answers from that cache when the network
//! fails, and prunes every other generation when it activates.
//!
//! The worker itself is three handlers ([`OfflineWorker::install`],
//! [`OfflineWorker::activate`] and [`OfflineWorker::fetch`]) over two seams:
//! a [`CacheStorage`] holding named generations and a [`Network`] that
//! performs live fetches. [`Registration`] plays the host's part, driving
//! the lifecycle and routing fetches to the active worker.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use offline_cache_worker::{
//!     FetchRequest, HttpNetwork, MemoryCacheStorage, Registration, WorkerConfig,
//! };
//!
//! # async fn example() -> offline_cache_worker::Result<()> {
//! let origin = url::Url::parse("http://localhost:8000").unwrap();
//! let registration = Registration::new(
//!     Arc::new(MemoryCacheStorage::new()),
//!     Arc::new(HttpNetwork::new(origin, Duration::from_secs(30))?),
//! );
//!
//! registration.register(WorkerConfig::default()).await?;
//!
//! let outcome = registration.fetch(&FetchRequest::navigate("/portal/")).await;
//! println!("served from {}", outcome.source());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod network;
pub mod registration;
pub mod storage;
pub mod types;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use config::WorkerConfig;
pub use error::{OfflineCacheError, Result};
pub use lifecycle::WorkerState;
pub use network::{HttpNetwork, Network};
pub use registration::{Registration, RegistrationStatus, WorkerStatus};
pub use storage::{CacheStorage, FileCacheStorage, MemoryCacheStorage};
pub use types::{cache_key, CacheEntry, CacheStats, FetchRequest, FetchResponse, RequestMode};
pub use worker::{ActivateReport, FetchOutcome, InstallReport, OfflineWorker};
