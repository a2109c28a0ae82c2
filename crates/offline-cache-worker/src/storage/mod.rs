//! Cache storage: named generations of request-identity -> response entries

mod file;
mod memory;

pub use file::FileCacheStorage;
pub use memory::MemoryCacheStorage;

use crate::error::Result;
use crate::types::{CacheStats, FetchResponse};
use async_trait::async_trait;

/// A store of named cache generations.
///
/// Implementations are internally synchronized; every method may be called
/// concurrently from several handlers.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a generation, creating it empty if it does not exist
    async fn open(&self, name: &str) -> Result<()>;

    /// Store every entry in the named generation, or none of them.
    ///
    /// Creates the generation if needed and replaces entries with the same
    /// key.
    async fn put_all(&self, name: &str, entries: Vec<(String, FetchResponse)>) -> Result<()>;

    /// Look up a request identity in one generation
    async fn match_in(&self, name: &str, key: &str) -> Result<Option<FetchResponse>>;

    /// Look up a request identity across all generations in creation order
    async fn match_any(&self, key: &str) -> Result<Option<FetchResponse>>;

    /// Generation names in creation order
    async fn keys(&self) -> Result<Vec<String>>;

    /// Delete a generation; returns whether it existed
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Request identities stored in a generation, sorted
    async fn entry_keys(&self, name: &str) -> Result<Vec<String>>;

    async fn stats(&self) -> CacheStats;
}
