//! File-backed cache storage with an in-memory index
//!
//! Layout under the root directory:
//!
//! ```text
//! <sha256(generation name)>/
//!     generation.json          name + creation time
//!     <sha256(key)>.json       entry metadata
//!     <sha256(key)>.body       response body
//! .staging-*/                  in-flight put_all batches
//! ```

use super::CacheStorage;
use crate::error::Result;
use crate::types::{CacheEntry, CacheStats, FetchResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "generation.json";
const STAGING_PREFIX: &str = ".staging-";

#[derive(Debug, Serialize, Deserialize)]
struct GenerationManifest {
    name: String,
    created_at: DateTime<Utc>,
}

/// A file moved into a generation during a commit
struct PlacedFile {
    target: PathBuf,
    /// Where the file it replaced was set aside
    backup: Option<PathBuf>,
    moved: bool,
}

struct GenerationIndex {
    name: String,
    dir: PathBuf,
    created_at: DateTime<Utc>,
    entries: HashMap<String, CacheEntry>,
}

/// Cache storage persisted under a directory
pub struct FileCacheStorage {
    root: PathBuf,
    /// Generations in creation order
    index: RwLock<Vec<GenerationIndex>>,
    staging_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl FileCacheStorage {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            index: RwLock::new(Vec::new()),
            staging_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// File-system safe name for a generation name or request identity
    pub fn hashed_name(value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Ensure the root exists and rebuild the index from disk.
    ///
    /// Staging directories left behind by an interrupted `put_all` are
    /// removed, as are generation directories whose manifest is missing or
    /// unreadable, since nothing could ever look them up again.
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;

        let mut generations = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(item) = dir.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }

            let path = item.path();
            if item.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                warn!(path = ?path, "Removing abandoned staging directory");
                let _ = fs::remove_dir_all(&path).await;
                continue;
            }

            match Self::load_generation(&path).await {
                Ok(Some(generation)) => generations.push(generation),
                Ok(None) => {
                    warn!(path = ?path, "Removing cache directory without manifest");
                    Self::remove_orphan(&path).await;
                }
                Err(e) => {
                    warn!(path = ?path, error = %e, "Removing unreadable cache generation");
                    Self::remove_orphan(&path).await;
                }
            }
        }

        generations.sort_by_key(|g| g.created_at);
        info!(
            root = ?self.root,
            generations = generations.len(),
            "Cache storage initialized"
        );
        *self.index.write().await = generations;
        Ok(())
    }

    async fn load_generation(dir: &Path) -> Result<Option<GenerationIndex>> {
        let raw = match fs::read(dir.join(MANIFEST_FILE)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest: GenerationManifest = serde_json::from_slice(&raw)?;

        let mut entries = HashMap::new();
        let mut files = fs::read_dir(dir).await?;
        while let Some(file) = files.next_entry().await? {
            let path = file.path();
            if path.file_name() == Some(OsStr::new(MANIFEST_FILE))
                || path.extension() != Some(OsStr::new("json"))
            {
                continue;
            }

            if fs::metadata(path.with_extension("body")).await.is_err() {
                warn!(path = ?path, "Entry metadata without body, skipping");
                continue;
            }

            match Self::read_entry(&path).await {
                Ok(entry) => {
                    entries.insert(entry.key.clone(), entry);
                }
                Err(e) => warn!(path = ?path, error = %e, "Failed to read entry metadata"),
            }
        }

        Ok(Some(GenerationIndex {
            name: manifest.name,
            dir: dir.to_path_buf(),
            created_at: manifest.created_at,
            entries,
        }))
    }

    async fn remove_orphan(path: &Path) {
        if let Err(e) = fs::remove_dir_all(path).await {
            warn!(path = ?path, error = %e, "Failed to remove cache directory");
        }
    }

    async fn read_entry(path: &Path) -> Result<CacheEntry> {
        let raw = fs::read(path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn entry_file(dir: &Path, hashed_key: &str, extension: &str) -> PathBuf {
        dir.join(format!("{}.{}", hashed_key, extension))
    }

    /// Index position of a generation, creating it on disk if missing
    async fn ensure_generation(
        &self,
        generations: &mut Vec<GenerationIndex>,
        name: &str,
    ) -> Result<usize> {
        if let Some(index) = generations.iter().position(|g| g.name == name) {
            return Ok(index);
        }

        let dir = self.root.join(Self::hashed_name(name));
        fs::create_dir_all(&dir).await?;

        let manifest = GenerationManifest {
            name: name.to_string(),
            created_at: Utc::now(),
        };
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?).await?;

        generations.push(GenerationIndex {
            name: manifest.name,
            dir,
            created_at: manifest.created_at,
            entries: HashMap::new(),
        });
        debug!(cache_name = %name, "Created cache generation");
        Ok(generations.len() - 1)
    }

    /// Write every entry into the staging directory
    async fn stage_entries(
        staging: &Path,
        entries: &[(String, FetchResponse)],
    ) -> Result<Vec<(String, CacheEntry)>> {
        let mut staged = Vec::with_capacity(entries.len());
        for (key, response) in entries {
            let hashed = Self::hashed_name(key);
            let entry = CacheEntry::from_response(key, response);
            fs::write(Self::entry_file(staging, &hashed, "body"), &response.body).await?;
            fs::write(
                Self::entry_file(staging, &hashed, "json"),
                serde_json::to_vec(&entry)?,
            )
            .await?;
            staged.retain(|(existing, _)| existing != &hashed);
            staged.push((hashed, entry));
        }
        Ok(staged)
    }

    /// Move staged files into the generation, then index them.
    ///
    /// If any move fails, every file already moved is taken out again and
    /// any entry it replaced is put back, so the generation and its index
    /// are left exactly as they were.
    async fn commit_staged(
        staging: &Path,
        generation: &mut GenerationIndex,
        staged: Vec<(String, CacheEntry)>,
    ) -> Result<()> {
        let mut placed = Vec::new();
        if let Err(e) = Self::place_staged(staging, &generation.dir, &staged, &mut placed).await {
            warn!(cache_name = %generation.name, error = %e, "Commit failed, rolling back");
            Self::roll_back(placed).await;
            return Err(e);
        }

        for (_, entry) in staged {
            generation.entries.insert(entry.key.clone(), entry);
        }
        Ok(())
    }

    async fn place_staged(
        staging: &Path,
        dir: &Path,
        staged: &[(String, CacheEntry)],
        placed: &mut Vec<PlacedFile>,
    ) -> Result<()> {
        for (hashed, _) in staged {
            // Body first: an entry is only loaded when both files exist.
            for extension in ["body", "json"] {
                let target = Self::entry_file(dir, hashed, extension);
                let backup = match fs::metadata(&target).await {
                    Ok(meta) if meta.is_file() => {
                        let backup = staging.join(format!("{}.{}.prev", hashed, extension));
                        fs::rename(&target, &backup).await?;
                        Some(backup)
                    }
                    _ => None,
                };
                placed.push(PlacedFile {
                    target: target.clone(),
                    backup,
                    moved: false,
                });

                fs::rename(Self::entry_file(staging, hashed, extension), &target).await?;
                if let Some(last) = placed.last_mut() {
                    last.moved = true;
                }
            }
        }
        Ok(())
    }

    async fn roll_back(placed: Vec<PlacedFile>) {
        for file in placed.into_iter().rev() {
            if file.moved {
                if let Err(e) = fs::remove_file(&file.target).await {
                    warn!(path = ?file.target, error = %e, "Rollback could not remove file");
                }
            }
            if let Some(backup) = file.backup {
                if let Err(e) = fs::rename(&backup, &file.target).await {
                    warn!(path = ?file.target, error = %e, "Rollback could not restore file");
                }
            }
        }
    }

    async fn read_response(generation: &GenerationIndex, key: &str) -> Option<FetchResponse> {
        let entry = generation.entries.get(key)?;
        let body_path = Self::entry_file(&generation.dir, &Self::hashed_name(key), "body");

        match fs::read(&body_path).await {
            Ok(body) => Some(entry.clone().into_response(body)),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read cached body");
                None
            }
        }
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
impl CacheStorage for FileCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let mut generations = self.index.write().await;
        self.ensure_generation(&mut generations, name).await?;
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: Vec<(String, FetchResponse)>) -> Result<()> {
        let staging = self.root.join(format!(
            "{}{}-{}",
            STAGING_PREFIX,
            Self::hashed_name(name),
            self.staging_seq.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&staging).await?;

        let staged = match Self::stage_entries(&staging, &entries).await {
            Ok(staged) => staged,
            Err(e) => {
                warn!(cache_name = %name, error = %e, "Failed to stage cache entries");
                let _ = fs::remove_dir_all(&staging).await;
                return Err(e);
            }
        };

        let mut generations = self.index.write().await;
        let result = match self.ensure_generation(&mut generations, name).await {
            Ok(index) => Self::commit_staged(&staging, &mut generations[index], staged).await,
            Err(e) => Err(e),
        };
        let _ = fs::remove_dir_all(&staging).await;
        result?;

        let count = entries.len() as u64;
        self.writes.fetch_add(count, Ordering::Relaxed);
        debug!(cache_name = %name, count, "Stored cache entries");
        Ok(())
    }

    async fn match_in(&self, name: &str, key: &str) -> Result<Option<FetchResponse>> {
        let generations = self.index.read().await;
        let found = match generations.iter().find(|g| g.name == name) {
            Some(generation) => Self::read_response(generation, key).await,
            None => None,
        };
        self.record_lookup(found.is_some());
        Ok(found)
    }

    async fn match_any(&self, key: &str) -> Result<Option<FetchResponse>> {
        let generations = self.index.read().await;
        let mut found = None;
        for generation in generations.iter() {
            if let Some(response) = Self::read_response(generation, key).await {
                found = Some(response);
                break;
            }
        }
        self.record_lookup(found.is_some());
        Ok(found)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let generations = self.index.read().await;
        Ok(generations.iter().map(|g| g.name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut generations = self.index.write().await;
        let Some(index) = generations.iter().position(|g| g.name == name) else {
            return Ok(false);
        };

        match fs::remove_dir_all(&generations[index].dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        generations.remove(index);
        debug!(cache_name = %name, "Deleted cache generation");
        Ok(true)
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<String>> {
        let generations = self.index.read().await;
        let mut keys: Vec<String> = generations
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn stats(&self) -> CacheStats {
        let generations = self.index.read().await;
        CacheStats {
            generations: generations.len(),
            entries: generations.iter().map(|g| g.entries.len()).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}
