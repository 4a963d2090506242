//! Persistent key/value stores for compiled artifacts

use crate::compile::artifact::CompiledArtifact;
use crate::error::{TrellisError, TrellisResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::debug;

/// Durable key to serialized-artifact store.
///
/// A missing key is `Ok(None)`, not an error. Callers treat every failure
/// of either method as a cache miss.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Look up a serialized record
    async fn fetch(&self, key: &str) -> TrellisResult<Option<String>>;

    /// Store a serialized record, replacing any previous value
    async fn put(&self, key: &str, value: String) -> TrellisResult<()>;
}

/// Record written to the persistent tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub artifact: CompiledArtifact,
    pub compiled_at: DateTime<Utc>,
}

impl StoredArtifact {
    pub fn new(artifact: CompiledArtifact) -> Self {
        Self {
            artifact,
            compiled_at: Utc::now(),
        }
    }
}

/// One file per key under a cache directory
pub struct DiskStore {
    dir: PathBuf,
}

/// Summary of one persisted entry
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub key: String,
    pub filename: String,
    pub compiled_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl DiskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// List every readable entry, newest first
    pub async fn list(&self) -> TrellisResult<Vec<StoreEntry>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }

        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| TrellisError::io("reading compiler cache directory", e))?;

        let mut found = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TrellisError::io("reading compiler cache entry", e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(key) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let Ok(content) = fs::read_to_string(&path).await else {
                continue;
            };
            if let Ok(stored) = serde_json::from_str::<StoredArtifact>(&content) {
                found.push(StoreEntry {
                    key,
                    filename: stored.artifact.filename,
                    compiled_at: stored.compiled_at,
                    size_bytes: content.len() as u64,
                });
            }
        }

        found.sort_by(|a, b| b.compiled_at.cmp(&a.compiled_at));
        Ok(found)
    }

    /// Remove every entry, returning how many were deleted
    pub async fn clear(&self) -> TrellisResult<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| TrellisError::io("reading compiler cache directory", e))?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TrellisError::io("reading compiler cache entry", e))?
        {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(entry.path())
                    .await
                    .map_err(|e| TrellisError::io("removing compiler cache entry", e))?;
                removed += 1;
            }
        }

        debug!("Removed {} compiler cache entries", removed);
        Ok(removed)
    }
}

#[async_trait]
impl ArtifactStore for DiskStore {
    async fn fetch(&self, key: &str) -> TrellisResult<Option<String>> {
        let path = self.entry_path(key);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TrellisError::cache_io(
                format!("reading {}", path.display()),
                e,
            )),
        }
    }

    async fn put(&self, key: &str, value: String) -> TrellisResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| TrellisError::cache_io("creating compiler cache directory", e))?;

        // Write then rename so concurrent readers never see a torn file
        let path = self.entry_path(key);
        let tmp = self
            .dir
            .join(format!("{}.{}.tmp", key, uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, value)
            .await
            .map_err(|e| TrellisError::cache_io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| TrellisError::cache_io(format!("renaming into {}", path.display()), e))?;

        Ok(())
    }
}

/// In-process store, shared by every cache holding the same `Arc`
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn fetch(&self, key: &str) -> TrellisResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| TrellisError::Internal("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> TrellisResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| TrellisError::Internal("memory store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn stored(filename: &str) -> String {
        let artifact = CompiledArtifact {
            filename: filename.to_string(),
            frontmatter: vec![],
            program: vec![],
            css_deps: BTreeSet::new(),
            diagnostics: vec![],
        };
        serde_json::to_string(&StoredArtifact::new(artifact)).unwrap()
    }

    #[tokio::test]
    async fn disk_store_put_and_fetch() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::new(temp.path().join("compiler"));

        store.put("compiler-cache-abc", stored("a.tmpl")).await.unwrap();
        let fetched = store.fetch("compiler-cache-abc").await.unwrap().unwrap();

        assert!(fetched.contains("a.tmpl"));
    }

    #[tokio::test]
    async fn disk_store_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::new(temp.path());
        assert!(store.fetch("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disk_store_list_and_clear() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::new(temp.path());

        store.put("k1", stored("one.tmpl")).await.unwrap();
        store.put("k2", stored("two.tmpl")).await.unwrap();
        std::fs::write(temp.path().join("stray.txt"), "ignored").unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.list().await.unwrap().is_empty());
        assert!(temp.path().join("stray.txt").exists());
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.put("k", "v".to_string()).await.unwrap();
        assert_eq!(store.fetch("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.keys(), vec!["k".to_string()]);
    }
}
