//! Two-tier compilation cache
//!
//! The in-memory tier maps `(configuration identity, filename)` to an
//! artifact. It is partitioned by the address of the `Arc<SiteConfig>` and
//! each partition only holds a `Weak` back to its configuration, so dropping
//! the last strong reference retires the whole partition.
//!
//! The persistent tier is addressed purely by content digest and written in
//! the background; its failures never reach the caller.
//!
//! Concurrent misses for the same key are not de-duplicated. Both callers
//! compile, the last in-memory write wins, and the persistent tier sees a
//! redundant write at most.

use crate::compile::artifact::CompiledArtifact;
use crate::compile::compiler::Compiler;
use crate::compile::digest::{content_digest, store_key};
use crate::compile::store::{ArtifactStore, StoredArtifact};
use crate::config::SiteConfig;
use crate::error::TrellisResult;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// In-memory entries owned by one configuration instance
struct Partition {
    owner: Weak<SiteConfig>,
    entries: HashMap<String, Arc<CompiledArtifact>>,
}

impl Partition {
    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

/// Hit and miss counters
#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    persistent_hits: AtomicU64,
    compiles: AtomicU64,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub persistent_hits: u64,
    pub compiles: u64,
}

/// Content-addressed compilation cache
pub struct CompilationCache {
    compiler: Arc<dyn Compiler>,
    store: Option<Arc<dyn ArtifactStore>>,
    // Keyed by `Arc::as_ptr`. The `Weak` in each partition keeps the
    // allocation reserved, so an address cannot be reused while its
    // partition exists.
    partitions: Mutex<HashMap<usize, Partition>>,
    writes: Mutex<JoinSet<()>>,
    counters: Counters,
}

fn identity(config: &Arc<SiteConfig>) -> usize {
    Arc::as_ptr(config) as usize
}

impl CompilationCache {
    /// Create a cache with only the in-memory tier
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self {
            compiler,
            store: None,
            partitions: Mutex::new(HashMap::new()),
            writes: Mutex::new(JoinSet::new()),
            counters: Counters::default(),
        }
    }

    /// Attach a persistent tier
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn partitions(&self) -> MutexGuard<'_, HashMap<usize, Partition>> {
        // Entries are plain inserts and removals, a poisoned map is still consistent
        self.partitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn writes(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait for background writes to the persistent tier started so far
    pub async fn flush(&self) {
        let mut writes = std::mem::take(&mut *self.writes());
        while writes.join_next().await.is_some() {}
    }

    /// True iff an in-memory entry exists for this exact configuration object
    pub fn is_cached(&self, config: &Arc<SiteConfig>, filename: &str) -> bool {
        self.get(config, filename).is_some()
    }

    /// Pure in-memory lookup
    pub fn get(&self, config: &Arc<SiteConfig>, filename: &str) -> Option<Arc<CompiledArtifact>> {
        self.partitions()
            .get(&identity(config))
            .filter(|p| p.is_live())
            .and_then(|p| p.entries.get(filename).cloned())
    }

    /// Drop the in-memory entry. The persistent tier is left alone; stale
    /// records there are only ever superseded by a digest mismatch.
    pub fn invalidate(&self, config: &Arc<SiteConfig>, filename: &str) {
        if let Some(partition) = self.partitions().get_mut(&identity(config)) {
            partition.entries.remove(filename);
        }
    }

    /// Number of live configuration partitions
    pub fn partition_count(&self) -> usize {
        self.partitions().values().filter(|p| p.is_live()).count()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            persistent_hits: self.counters.persistent_hits.load(Ordering::Relaxed),
            compiles: self.counters.compiles.load(Ordering::Relaxed),
        }
    }

    fn remember(&self, config: &Arc<SiteConfig>, filename: &str, artifact: Arc<CompiledArtifact>) {
        let mut partitions = self.partitions();
        partitions.retain(|_, p| p.is_live());
        partitions
            .entry(identity(config))
            .or_insert_with(|| Partition {
                owner: Arc::downgrade(config),
                entries: HashMap::new(),
            })
            .entries
            .insert(filename.to_string(), artifact);
    }

    /// Return the artifact for `filename`, compiling only on a full miss.
    ///
    /// Lookup order: in-memory tier, persistent tier by digest, compiler.
    pub async fn get_or_compile(
        &self,
        config: &Arc<SiteConfig>,
        filename: &str,
        source: &str,
    ) -> TrellisResult<Arc<CompiledArtifact>> {
        if let Some(artifact) = self.get(config, filename) {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(artifact);
        }

        let start = Instant::now();
        let key = store_key(&content_digest(config, source)?);

        if let Some(artifact) = self.fetch_persisted(&key).await {
            let artifact = Arc::new(artifact);
            self.remember(config, filename, artifact.clone());
            self.counters.persistent_hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit for {} in {:?}", filename, start.elapsed());
            return Ok(artifact);
        }

        let artifact = Arc::new(self.compiler.compile(config, filename, source).await?);
        self.counters.compiles.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for {} in {:?}", filename, start.elapsed());

        self.remember(config, filename, artifact.clone());
        self.persist_detached(key, &artifact);

        Ok(artifact)
    }

    /// Persistent lookup; any failure degrades to a miss
    async fn fetch_persisted(&self, key: &str) -> Option<CompiledArtifact> {
        let store = self.store.as_ref()?;

        let raw = match store.fetch(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Compiler cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<StoredArtifact>(&raw) {
            Ok(stored) => Some(stored.artifact),
            Err(e) => {
                warn!("Discarding unreadable compiler cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Fire-and-forget write to the persistent tier
    fn persist_detached(&self, key: String, artifact: &CompiledArtifact) {
        let Some(store) = self.store.clone() else {
            return;
        };

        let payload = match serde_json::to_string(&StoredArtifact::new(artifact.clone())) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize artifact for {}: {}", key, e);
                return;
            }
        };

        let mut writes = self.writes();
        while writes.try_join_next().is_some() {}
        writes.spawn(async move {
            if let Err(e) = store.put(&key, payload).await {
                debug!("Ignoring compiler cache write failure for {}: {}", key, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compiler::TemplateCompiler;
    use crate::compile::store::MemoryStore;
    use crate::error::TrellisError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Counts calls and delegates to the real compiler
    #[derive(Default)]
    struct CountingCompiler {
        calls: AtomicUsize,
    }

    impl CountingCompiler {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Compiler for CountingCompiler {
        async fn compile(
            &self,
            config: &SiteConfig,
            filename: &str,
            source: &str,
        ) -> TrellisResult<CompiledArtifact> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            TemplateCompiler.compile(config, filename, source).await
        }
    }

    /// Store whose every operation fails
    struct BrokenStore;

    #[async_trait]
    impl ArtifactStore for BrokenStore {
        async fn fetch(&self, _key: &str) -> TrellisResult<Option<String>> {
            Err(TrellisError::cache_io(
                "fetch",
                std::io::Error::other("disk on fire"),
            ))
        }

        async fn put(&self, _key: &str, _value: String) -> TrellisResult<()> {
            Err(TrellisError::cache_io(
                "put",
                std::io::Error::other("disk on fire"),
            ))
        }
    }

    fn cache_with(compiler: Arc<CountingCompiler>, store: Arc<MemoryStore>) -> CompilationCache {
        CompilationCache::new(compiler).with_store(store)
    }

    /// Wait for detached persistent writes to land
    async fn settle(store: &MemoryStore, expected: usize) {
        for _ in 0..100 {
            if store.len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("persistent store never reached {} entries", expected);
    }

    #[tokio::test]
    async fn second_call_skips_compiler() {
        let compiler = Arc::new(CountingCompiler::default());
        let cache = CompilationCache::new(compiler.clone());
        let c1 = Arc::new(SiteConfig::default());

        let first = cache.get_or_compile(&c1, "page.tmpl", "<h1>Hi</h1>").await.unwrap();
        let second = cache.get_or_compile(&c1, "page.tmpl", "<h1>Hi</h1>").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(compiler.calls(), 1);
        assert_eq!(cache.stats().memory_hits, 1);
    }

    #[tokio::test]
    async fn lookup_and_invalidate() {
        let cache = CompilationCache::new(Arc::new(TemplateCompiler));
        let config = Arc::new(SiteConfig::default());

        assert!(!cache.is_cached(&config, "a.tmpl"));
        assert!(cache.get(&config, "a.tmpl").is_none());

        cache.get_or_compile(&config, "a.tmpl", "a").await.unwrap();
        assert!(cache.is_cached(&config, "a.tmpl"));

        cache.invalidate(&config, "a.tmpl");
        assert!(!cache.is_cached(&config, "a.tmpl"));
    }

    #[tokio::test]
    async fn persistent_tier_survives_new_config_instance() {
        let compiler = Arc::new(CountingCompiler::default());
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(compiler.clone(), store.clone());

        let c1 = Arc::new(SiteConfig::default());
        let from_compiler = cache.get_or_compile(&c1, "page.tmpl", "<h1>Hi</h1>").await.unwrap();
        settle(&store, 1).await;

        let c2 = Arc::new(SiteConfig::default());
        let from_store = cache.get_or_compile(&c2, "page.tmpl", "<h1>Hi</h1>").await.unwrap();

        assert_eq!(compiler.calls(), 1);
        assert_eq!(*from_compiler, *from_store);
        assert_eq!(cache.stats().persistent_hits, 1);
    }

    #[tokio::test]
    async fn invalidate_keeps_persistent_entry() {
        let compiler = Arc::new(CountingCompiler::default());
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(compiler.clone(), store.clone());
        let config = Arc::new(SiteConfig::default());

        cache.get_or_compile(&config, "p.tmpl", "body").await.unwrap();
        settle(&store, 1).await;

        cache.invalidate(&config, "p.tmpl");
        cache.get_or_compile(&config, "p.tmpl", "body").await.unwrap();

        assert_eq!(compiler.calls(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn changed_source_forces_compile() {
        let compiler = Arc::new(CountingCompiler::default());
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(compiler.clone(), store.clone());
        let config = Arc::new(SiteConfig::default());

        cache.get_or_compile(&config, "p.tmpl", "<p>one</p>").await.unwrap();
        settle(&store, 1).await;
        cache.invalidate(&config, "p.tmpl");

        let updated = cache.get_or_compile(&config, "p.tmpl", "<p>one!</p>").await.unwrap();
        settle(&store, 2).await;

        assert_eq!(compiler.calls(), 2);
        assert!(format!("{:?}", updated.program).contains("one!"));
    }

    #[tokio::test]
    async fn changed_config_content_forces_compile() {
        let compiler = Arc::new(CountingCompiler::default());
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(compiler.clone(), store.clone());

        let c1 = Arc::new(SiteConfig::default());
        cache.get_or_compile(&c1, "p.tmpl", "x").await.unwrap();
        settle(&store, 1).await;

        let c2 = Arc::new(SiteConfig {
            base: "/docs".to_string(),
            ..SiteConfig::default()
        });
        cache.get_or_compile(&c2, "p.tmpl", "x").await.unwrap();

        assert_eq!(compiler.calls(), 2);
        assert_eq!(cache.stats().persistent_hits, 0);
    }

    #[tokio::test]
    async fn partitions_isolated_by_identity() {
        let cache = CompilationCache::new(Arc::new(TemplateCompiler));
        let c1 = Arc::new(SiteConfig::default());
        let c2 = Arc::new(SiteConfig::default());
        assert_eq!(*c1, *c2);

        cache.get_or_compile(&c1, "a.tmpl", "a").await.unwrap();
        assert!(!cache.is_cached(&c2, "a.tmpl"));

        cache.get_or_compile(&c2, "a.tmpl", "a").await.unwrap();
        cache.invalidate(&c1, "a.tmpl");

        assert!(!cache.is_cached(&c1, "a.tmpl"));
        assert!(cache.is_cached(&c2, "a.tmpl"));
    }

    #[tokio::test]
    async fn dropped_config_releases_partition() {
        let cache = CompilationCache::new(Arc::new(TemplateCompiler));
        let c1 = Arc::new(SiteConfig::default());
        cache.get_or_compile(&c1, "a.tmpl", "a").await.unwrap();
        assert_eq!(cache.partition_count(), 1);
        assert_eq!(Arc::strong_count(&c1), 1);

        drop(c1);
        assert_eq!(cache.partition_count(), 0);

        let c2 = Arc::new(SiteConfig::default());
        cache.get_or_compile(&c2, "b.tmpl", "b").await.unwrap();
        assert_eq!(cache.partitions().len(), 1);
    }

    #[tokio::test]
    async fn flush_waits_for_background_writes() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(Arc::new(CountingCompiler::default()), store.clone());
        let config = Arc::new(SiteConfig::default());

        for (name, body) in [("a.tmpl", "a"), ("b.tmpl", "b"), ("c.tmpl", "c")] {
            cache.get_or_compile(&config, name, body).await.unwrap();
        }
        cache.flush().await;

        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn broken_store_degrades_to_compile() {
        let compiler = Arc::new(CountingCompiler::default());
        let cache = CompilationCache::new(compiler.clone()).with_store(Arc::new(BrokenStore));
        let config = Arc::new(SiteConfig::default());

        let artifact = cache.get_or_compile(&config, "p.tmpl", "<b>ok</b>").await.unwrap();
        cache.flush().await;

        assert_eq!(artifact.filename, "p.tmpl");
        assert_eq!(compiler.calls(), 1);
    }

    #[tokio::test]
    async fn corrupt_persistent_entry_is_a_miss() {
        let compiler = Arc::new(CountingCompiler::default());
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(SiteConfig::default());
        let key = store_key(&content_digest(&config, "src").unwrap());
        store.put(&key, "{not json".to_string()).await.unwrap();

        let cache = cache_with(compiler.clone(), store);
        cache.get_or_compile(&config, "p.tmpl", "src").await.unwrap();

        assert_eq!(compiler.calls(), 1);
    }

    #[tokio::test]
    async fn compile_errors_surface_and_cache_nothing() {
        let cache = CompilationCache::new(Arc::new(TemplateCompiler));
        let config = Arc::new(SiteConfig::default());

        let err = cache
            .get_or_compile(&config, "bad.tmpl", "{% endif %}")
            .await
            .unwrap_err();

        assert!(matches!(err, TrellisError::Compile { .. }));
        assert!(!cache.is_cached(&config, "bad.tmpl"));
    }

    #[tokio::test]
    async fn concurrent_misses_converge() {
        let compiler = Arc::new(CountingCompiler::default());
        let cache = Arc::new(CompilationCache::new(compiler.clone()));
        let config = Arc::new(SiteConfig::default());

        let (a, b) = tokio::join!(
            cache.get_or_compile(&config, "p.tmpl", "<p>same</p>"),
            cache.get_or_compile(&config, "p.tmpl", "<p>same</p>"),
        );

        assert_eq!(*a.unwrap(), *b.unwrap());
        assert!((1..=2).contains(&compiler.calls()));
        assert!(cache.is_cached(&config, "p.tmpl"));
    }
}
