//! Response bodies served by the proxy itself

use offline_cache_worker::CacheStats;
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    /// Cache generation this proxy is configured for
    pub cache_name: String,
    pub active_version: Option<String>,
    pub waiting_version: Option<String>,
    pub cache: CacheStats,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
