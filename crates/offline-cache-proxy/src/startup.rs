//! Start-up sequencing for the hosted worker
//!
//! The version that was last activated is recorded next to the cache, so a
//! restart brings that version back even when the configured version has
//! changed and cannot be installed yet.

use crate::error::Result;
use crate::server::ProxyRegistration;
use chrono::{DateTime, Utc};
use offline_cache_worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

const ACTIVE_RECORD_FILE: &str = "active.json";

/// The worker version that was active when the proxy last changed versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRecord {
    pub worker: WorkerConfig,
    pub activated_at: DateTime<Utc>,
}

pub fn active_record_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(ACTIVE_RECORD_FILE)
}

/// Read the record; a missing or unreadable record is treated as none
pub async fn load_active_record(path: &Path) -> Option<ActiveRecord> {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = ?path, error = %e, "Failed to read active worker record");
            }
            return None;
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(path = ?path, error = %e, "Ignoring corrupt active worker record");
            None
        }
    }
}

pub async fn save_active_record(path: &Path, worker: &WorkerConfig) -> Result<()> {
    let record = ActiveRecord {
        worker: worker.clone(),
        activated_at: Utc::now(),
    };
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(&record)?).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Bring the previously active version back, then register the configured
/// one.
///
/// A failed install or activation is logged and leaves whatever was
/// restored serving. Only a successful registration replaces the record.
pub async fn bring_up(
    registration: &ProxyRegistration,
    worker: &WorkerConfig,
    record_path: &Path,
) -> Result<()> {
    let previous = load_active_record(record_path)
        .await
        .map(|record| record.worker)
        .unwrap_or_else(|| worker.clone());

    if registration.restore(previous.clone()).await? {
        info!(cache_name = %previous.cache_name, "Serving existing cache generation");
    }

    match registration.register(worker.clone()).await {
        Ok(report) => {
            info!(
                cache_name = %report.cache_name,
                deleted = report.deleted.len(),
                "Offline cache ready"
            );
            if let Err(e) = save_active_record(record_path, worker).await {
                warn!(error = %e, "Failed to record active worker");
            }
        }
        Err(e) => warn!(error = %e, "Offline cache not updated, continuing with previous state"),
    }

    Ok(())
}
