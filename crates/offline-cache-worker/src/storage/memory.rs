//! In-process cache storage

use super::CacheStorage;
use crate::error::Result;
use crate::types::{CacheStats, FetchResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

struct Generation {
    name: String,
    entries: HashMap<String, FetchResponse>,
}

/// Cache storage kept entirely in memory
#[derive(Default)]
pub struct MemoryCacheStorage {
    /// Generations in creation order
    generations: RwLock<Vec<Generation>>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(generations: &[Generation], name: &str) -> Option<usize> {
        generations.iter().position(|g| g.name == name)
    }

    fn record_lookup(&self, found: bool) {
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let mut generations = self.generations.write().await;
        if Self::position(&generations, name).is_none() {
            generations.push(Generation {
                name: name.to_string(),
                entries: HashMap::new(),
            });
            debug!(cache_name = %name, "Created cache generation");
        }
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: Vec<(String, FetchResponse)>) -> Result<()> {
        let mut generations = self.generations.write().await;
        let index = match Self::position(&generations, name) {
            Some(index) => index,
            None => {
                generations.push(Generation {
                    name: name.to_string(),
                    entries: HashMap::new(),
                });
                generations.len() - 1
            }
        };

        let count = entries.len() as u64;
        generations[index].entries.extend(entries);
        self.writes.fetch_add(count, Ordering::Relaxed);
        debug!(cache_name = %name, count, "Stored cache entries");
        Ok(())
    }

    async fn match_in(&self, name: &str, key: &str) -> Result<Option<FetchResponse>> {
        let generations = self.generations.read().await;
        let found = Self::position(&generations, name)
            .and_then(|index| generations[index].entries.get(key).cloned());
        self.record_lookup(found.is_some());
        Ok(found)
    }

    async fn match_any(&self, key: &str) -> Result<Option<FetchResponse>> {
        let generations = self.generations.read().await;
        let found = generations
            .iter()
            .find_map(|g| g.entries.get(key).cloned());
        self.record_lookup(found.is_some());
        Ok(found)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let generations = self.generations.read().await;
        Ok(generations.iter().map(|g| g.name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut generations = self.generations.write().await;
        match Self::position(&generations, name) {
            Some(index) => {
                generations.remove(index);
                debug!(cache_name = %name, "Deleted cache generation");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<String>> {
        let generations = self.generations.read().await;
        let mut keys: Vec<String> = Self::position(&generations, name)
            .map(|index| generations[index].entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn stats(&self) -> CacheStats {
        let generations = self.generations.read().await;
        CacheStats {
            generations: generations.len(),
            entries: generations.iter().map(|g| g.entries.len()).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}
