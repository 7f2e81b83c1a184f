//! Semantic cache manager
//!
//! The coordinator owning the L1/L2 hierarchy: lookups run read-through
//! (L1, then embed + vector search, then the staleness pass), writes run
//! write-through (L2 first, then L1), and tag invalidation touches both
//! tiers. Read-path failures degrade to misses; write-path failures surface
//! to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::domain::{
    now_unix, CacheEntry, CacheError, DiscardReason, Freshness, KeyHasher, Reranker, Scope,
    SearchFilters, SearchHit, StalenessPolicy, VectorBackend, Vectorizer,
};
use crate::infrastructure::backend::RedisVectorBackend;
use crate::infrastructure::l1::{L1Cache, L1Entry, L1Stats};
use crate::infrastructure::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::infrastructure::refresh::{RefreshCallback, RefreshCoordinator};
use crate::infrastructure::rerankers::RerankerFactory;
use crate::infrastructure::tags::TagIndex;
use crate::infrastructure::vectorizers::VectorizerFactory;

/// One lookup in a batch
#[derive(Debug, Clone)]
pub struct CacheQuery {
    pub prompt: String,
    pub user_id: Option<String>,
    pub scope: Option<Scope>,
}

impl CacheQuery {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            user_id: None,
            scope: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Settings adjustable at runtime without rebuilding the manager
#[derive(Debug)]
struct RuntimeSettings {
    distance_threshold: f32,
    ttl: u64,
}

/// Two-tier semantic cache coordinator.
///
/// Cheap to clone; all state is shared behind `Arc`s so background refresh
/// tasks can hold their own handle.
#[derive(Clone)]
pub struct SemanticCacheManager {
    config: Arc<CacheConfig>,
    backend: Arc<dyn VectorBackend>,
    vectorizer: Arc<dyn Vectorizer>,
    reranker: Option<Arc<dyn Reranker>>,
    l1: Option<Arc<L1Cache>>,
    tags: Option<Arc<TagIndex>>,
    metrics: Arc<MetricsRegistry>,
    hasher: Arc<KeyHasher>,
    refresh: Arc<RefreshCoordinator>,
    refresh_callback: Option<RefreshCallback>,
    settings: Arc<RwLock<RuntimeSettings>>,
}

impl std::fmt::Debug for SemanticCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticCacheManager")
            .field("name", &self.config.name)
            .field("vectorizer", &self.vectorizer.provider_name())
            .field("l1_enabled", &self.l1.is_some())
            .field("tags_enabled", &self.tags.is_some())
            .field("reranker_enabled", &self.reranker.is_some())
            .finish()
    }
}

impl SemanticCacheManager {
    /// Build a manager over an already-constructed backend and vectorizer.
    pub fn new(
        config: CacheConfig,
        backend: Arc<dyn VectorBackend>,
        vectorizer: Arc<dyn Vectorizer>,
    ) -> Result<Self, CacheError> {
        config.validate()?;

        let l1 = config
            .l1_cache
            .enabled
            .then(|| Arc::new(L1Cache::new(&config.l1_cache)));
        let tags = config
            .enable_tags
            .then(|| Arc::new(TagIndex::new(Arc::clone(&backend), config.name.clone())));
        let hasher = KeyHasher::new(
            config.context_fields.clone(),
            config.enable_context_hashing,
        );
        let settings = RuntimeSettings {
            distance_threshold: config.distance_threshold,
            ttl: config.ttl,
        };

        info!(
            name = %config.name,
            l1 = config.l1_cache.enabled,
            tags = config.enable_tags,
            "Initializing semantic cache"
        );

        Ok(Self {
            config: Arc::new(config),
            backend,
            vectorizer,
            reranker: None,
            l1,
            tags,
            metrics: Arc::new(MetricsRegistry::new()),
            hasher: Arc::new(hasher),
            refresh: Arc::new(RefreshCoordinator::new()),
            refresh_callback: None,
            settings: Arc::new(RwLock::new(settings)),
        })
    }

    /// Connect to Redis and build the vectorizer and reranker from config.
    pub async fn connect(config: CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;

        let backend = Arc::new(RedisVectorBackend::connect(&config).await?);
        let vectorizer = VectorizerFactory::create(&config.vectorizer, config.embed_timeout())?;
        let reranker = RerankerFactory::create(&config.reranker, config.embed_timeout())?;

        let mut manager = Self::new(config, backend, vectorizer)?;
        manager.reranker = reranker;

        Ok(manager)
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_refresh_callback(mut self, callback: RefreshCallback) -> Self {
        self.refresh_callback = Some(callback);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Check the cache for a semantically similar prompt.
    ///
    /// Read-path failures never surface: backend or embedder errors are
    /// logged, counted in the `errors` metric, and reported as a miss.
    pub async fn check(
        &self,
        prompt: &str,
        user_id: Option<&str>,
        scope: Option<&Scope>,
    ) -> Option<String> {
        let start = Instant::now();
        self.metrics.record_query();

        if KeyHasher::normalize_prompt(prompt).is_empty() {
            warn!("check called with an empty prompt");
            self.metrics.record_miss();
            return None;
        }

        let l1_key = self.hasher.l1_key(prompt, user_id, scope);

        if let Some(ref l1) = self.l1 {
            if let Some(hit) = l1.get(&l1_key) {
                self.metrics.record_l1_hit(start.elapsed());
                self.metrics.record_hit();
                self.record_context_hit(scope);
                debug!(entry_id = %hit.entry_id, "L1 cache hit");
                return Some(hit.response);
            }
            self.metrics.record_l1_miss();
        }

        match self.check_l2(prompt, user_id, scope, &l1_key).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Cache check failed: {}", e);
                self.metrics.record_error();
                None
            }
        }
    }

    /// L2 half of a lookup: embed, range-search, rerank, staleness pass,
    /// then populate L1 with the winner.
    async fn check_l2(
        &self,
        prompt: &str,
        user_id: Option<&str>,
        scope: Option<&Scope>,
        l1_key: &str,
    ) -> Result<Option<String>, CacheError> {
        let l2_start = Instant::now();

        let embedding = self.embed(prompt).await?;
        let filters = self.build_filters(user_id, scope);
        let threshold = self.settings.read().distance_threshold;
        let k = self.config.effective_top_k();

        let hits = {
            let backend = Arc::clone(&self.backend);
            let embedding = embedding.clone();
            let filters = filters.clone();
            self.retry_with_backoff("vector search", move || {
                let backend = Arc::clone(&backend);
                let embedding = embedding.clone();
                let filters = filters.clone();
                async move {
                    backend
                        .vector_search(&embedding, &filters, k, threshold)
                        .await
                }
            })
            .await?
        };

        if hits.is_empty() {
            self.metrics.record_miss();
            self.metrics.record_l2_miss();
            debug!("Cache miss for prompt: '{}'", truncate(prompt, 50));
            return Ok(None);
        }

        let hits = self.apply_rerank(prompt, hits).await;
        let policy = self.staleness_policy();
        let now = now_unix();

        for hit in hits {
            match policy.evaluate(&hit.entry, now) {
                Freshness::Discard(DiscardReason::VersionMismatch) => {
                    self.metrics.record_version_mismatch();
                    debug!(
                        entry_id = %hit.entry.entry_id(),
                        stored = %hit.entry.version(),
                        current = %self.config.cache_version,
                        "Version mismatch, discarding candidate"
                    );
                }
                Freshness::Discard(DiscardReason::TooStale) => {
                    self.metrics.record_stale_refused();
                    debug!(
                        entry_id = %hit.entry.entry_id(),
                        age = hit.entry.age_seconds(now),
                        "Entry too stale, discarding candidate"
                    );
                }
                verdict => {
                    if let Freshness::Stale { refresh } = verdict {
                        let age = hit.entry.age_seconds(now);
                        self.metrics.record_stale_served(age);
                        info!(
                            entry_id = %hit.entry.entry_id(),
                            age,
                            refresh,
                            "Serving stale entry"
                        );
                        if refresh {
                            self.spawn_refresh(l1_key, prompt, user_id, scope, &hit.entry);
                        }
                    }

                    self.metrics.record_l2_hit(l2_start.elapsed());
                    self.metrics.record_hit();
                    self.record_context_hit(scope);
                    self.populate_l1(l1_key, &hit.entry);
                    debug!(
                        entry_id = %hit.entry.entry_id(),
                        distance = hit.distance,
                        "L2 cache hit"
                    );
                    return Ok(Some(hit.entry.response().to_string()));
                }
            }
        }

        self.metrics.record_miss();
        self.metrics.record_l2_miss();
        Ok(None)
    }

    /// Store a prompt/response pair in both tiers. Returns the entry id.
    pub async fn store(
        &self,
        prompt: &str,
        response: &str,
        user_id: Option<&str>,
        scope: Option<&Scope>,
        tags: Option<Vec<String>>,
        metadata: Option<serde_json::Value>,
    ) -> Result<String, CacheError> {
        if KeyHasher::normalize_prompt(prompt).is_empty() {
            return Err(CacheError::validation("prompt must not be empty"));
        }

        let tags = tags.unwrap_or_default();
        if !tags.is_empty() {
            if self.config.max_tags_per_entry == 0 {
                return Err(CacheError::validation(
                    "tagging is disabled (max_tags_per_entry = 0)",
                ));
            }
            if tags.len() > self.config.max_tags_per_entry {
                return Err(CacheError::validation(format!(
                    "{} tags exceed max_tags_per_entry = {}",
                    tags.len(),
                    self.config.max_tags_per_entry
                )));
            }
        }

        let ttl = self.settings.read().ttl;
        let mut entry =
            CacheEntry::new(prompt, response, ttl, &self.config.cache_version).with_tags(tags);
        if let Some(user_id) = user_id {
            entry = entry.with_user_id(user_id);
        }
        if let Some(scope_hash) = self.hasher.scope_hash(scope) {
            entry = entry.with_scope_hash(scope_hash);
        }
        if let Some(metadata) = metadata {
            entry = entry.with_metadata(metadata);
        }

        let embedding = self.embed(prompt).await?;

        // Physical retention outlives the logical TTL when stale serving is
        // on, otherwise stale candidates would be gone before they could be
        // served.
        let retention = if self.config.enable_stale_while_revalidate {
            Duration::from_secs(self.config.max_stale_age().max(ttl))
        } else {
            Duration::from_secs(ttl)
        };

        {
            let backend = Arc::clone(&self.backend);
            let entry = entry.clone();
            let embedding = embedding.clone();
            self.retry_with_backoff("index add", move || {
                let backend = Arc::clone(&backend);
                let entry = entry.clone();
                let embedding = embedding.clone();
                async move { backend.index_add(&entry, &embedding, retention).await }
            })
            .await?;
        }

        // Tag registration is best-effort: the entry stays valid and
        // discoverable by scope and user filters even if this fails.
        if !entry.tags().is_empty() {
            match self.tags {
                Some(ref tag_index) => {
                    if let Err(e) = tag_index.attach(entry.entry_id(), entry.tags()).await {
                        warn!(
                            entry_id = %entry.entry_id(),
                            "Failed to attach tags (non-fatal): {}", e
                        );
                    }
                }
                None => warn!("Tags supplied but tag support is disabled"),
            }
        }

        let l1_key = self.hasher.l1_key(prompt, user_id, scope);
        self.populate_l1(&l1_key, &entry);

        info!(
            entry_id = %entry.entry_id(),
            "Stored in cache: '{}'",
            truncate(prompt, 50)
        );

        Ok(entry.entry_id().to_string())
    }

    /// Check many prompts, preserving input order. Individual failures
    /// yield a miss for that slot only.
    pub async fn batch_check(&self, queries: &[CacheQuery]) -> Vec<Option<String>> {
        let n = queries.len();
        if n == 0 {
            return Vec::new();
        }

        let start = Instant::now();
        let mut results: Vec<Option<String>> = vec![None; n];
        let mut pending: Vec<usize> = Vec::new();

        // Phase 1: L1 lookups for every slot
        for (i, query) in queries.iter().enumerate() {
            self.metrics.record_query();

            if let Some(ref l1) = self.l1 {
                let l1_key = self.hasher.l1_key(
                    &query.prompt,
                    query.user_id.as_deref(),
                    query.scope.as_ref(),
                );
                if let Some(hit) = l1.get(&l1_key) {
                    self.metrics.record_l1_hit(start.elapsed());
                    self.metrics.record_hit();
                    self.record_context_hit(query.scope.as_ref());
                    results[i] = Some(hit.response);
                    continue;
                }
                self.metrics.record_l1_miss();
            }

            pending.push(i);
        }

        if pending.is_empty() {
            return results;
        }

        // Phase 2: bounded-concurrency L2 lookups for the misses
        let limit = self.config.batch_concurrency.unwrap_or(pending.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(limit));

        let lookups = pending.into_iter().map(|i| {
            let manager = self.clone();
            let query = queries[i].clone();
            let semaphore = Arc::clone(&semaphore);

            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let l1_key = manager.hasher.l1_key(
                    &query.prompt,
                    query.user_id.as_deref(),
                    query.scope.as_ref(),
                );
                let value = match manager
                    .check_l2(
                        &query.prompt,
                        query.user_id.as_deref(),
                        query.scope.as_ref(),
                        &l1_key,
                    )
                    .await
                {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Batch lookup slot failed: {}", e);
                        manager.metrics.record_error();
                        None
                    }
                };
                (i, value)
            }
        });

        for (i, value) in futures::future::join_all(lookups).await {
            results[i] = value;
        }

        let found = results.iter().filter(|r| r.is_some()).count();
        debug!(
            "Batch check: {} prompts, {} hits, {} misses",
            n,
            found,
            n - found
        );

        results
    }

    /// Invalidate every entry carrying the tag. Returns the number of
    /// distinct entries deleted. Idempotent.
    pub async fn invalidate_by_tag(&self, tag: &str) -> Result<usize, CacheError> {
        let tags = [tag.to_string()];
        self.invalidate_by_tags(&tags, false).await
    }

    /// Invalidate entries carrying any (`match_all = false`) or all
    /// (`match_all = true`) of the tags.
    pub async fn invalidate_by_tags(
        &self,
        tags: &[String],
        match_all: bool,
    ) -> Result<usize, CacheError> {
        let Some(ref tag_index) = self.tags else {
            warn!("Tag support is disabled; nothing to invalidate");
            return Ok(0);
        };

        if tags.is_empty() {
            return Ok(0);
        }

        let entry_ids = tag_index.resolve_many(tags, match_all).await?;
        if entry_ids.is_empty() {
            return Ok(0);
        }

        let mut deleted = 0usize;
        for entry_id in &entry_ids {
            if self.backend.delete(entry_id).await? {
                deleted += 1;
            }
            tag_index.remove_entry(entry_id).await?;
        }

        if let Some(ref l1) = self.l1 {
            l1.remove_entries(&entry_ids);
        }

        // In any-match mode every member of each target set was deleted, so
        // dropping the sets only clears stray members; in all-match mode the
        // sets keep entries outside the intersection.
        if !match_all {
            for tag in tags {
                tag_index.clear_tag(tag).await?;
            }
        }

        for tag in tags {
            self.metrics.record_tag_invalidation(tag, deleted as u64);
        }

        info!("Invalidated {} entries for tags {:?}", deleted, tags);
        Ok(deleted)
    }

    /// Drop every L1 entry. Never fails.
    pub fn clear_l1(&self) {
        if let Some(ref l1) = self.l1 {
            l1.clear();
        }
    }

    /// Drop every entry from both tiers.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.clear_l1();
        self.backend.clear().await?;
        info!("Cache cleared");
        Ok(())
    }

    /// Export the current metrics.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Render metrics in Prometheus text format.
    pub fn metrics_prometheus(&self) -> String {
        self.metrics.to_prometheus(
            &self.config.observability.metrics_prefix,
            self.config.observability.enable_detailed_metrics,
        )
    }

    /// Reset all metrics to zero.
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Current L1 statistics, when the tier is enabled.
    pub fn l1_stats(&self) -> Option<L1Stats> {
        self.l1.as_ref().map(|l1| l1.stats())
    }

    /// Adjust the semantic similarity threshold at runtime.
    pub fn set_distance_threshold(&self, threshold: f32) -> Result<(), CacheError> {
        if !(0.0..=2.0).contains(&threshold) {
            return Err(CacheError::validation(
                "distance_threshold must be within [0.0, 2.0]",
            ));
        }

        self.settings.write().distance_threshold = threshold;
        info!("Distance threshold updated to {}", threshold);
        Ok(())
    }

    /// Adjust the default TTL applied to new entries.
    pub fn set_ttl(&self, ttl: u64) {
        self.settings.write().ttl = ttl;
        info!("TTL updated to {}s", ttl);
    }

    // --- Internal helpers ---

    async fn embed(&self, prompt: &str) -> Result<Vec<f32>, CacheError> {
        let vectorizer = Arc::clone(&self.vectorizer);
        let timeout = self.config.embed_timeout();
        let text = prompt.to_string();

        self.retry_with_backoff("embed", move || {
            let vectorizer = Arc::clone(&vectorizer);
            let text = text.clone();
            async move {
                match tokio::time::timeout(timeout, vectorizer.embed(&text)).await {
                    Ok(result) => result,
                    Err(_) => Err(CacheError::timeout("embedding")),
                }
            }
        })
        .await
    }

    /// Run an operation with exponential backoff. Exhausting every attempt
    /// reports the backend as unavailable.
    async fn retry_with_backoff<T, F, Fut>(
        &self,
        operation: &str,
        mut op: F,
    ) -> Result<T, CacheError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CacheError>>,
    {
        let mut delay = Duration::from_millis(self.config.retry_backoff_base_ms);
        let mut last_error: Option<CacheError> = None;
        let attempts = self.config.max_retries + 1;

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt < attempts {
                        warn!(
                            "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                            operation, attempt, attempts, e, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(CacheError::backend(format!(
            "{} failed after {} attempts: {}",
            operation,
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn build_filters(&self, user_id: Option<&str>, scope: Option<&Scope>) -> SearchFilters {
        let mut filters = SearchFilters::new();

        if let Some(user_id) = user_id {
            filters = filters.with_user_id(user_id);
        }
        if let Some(scope_hash) = self.hasher.scope_hash(scope) {
            filters = filters.with_scope_hash(scope_hash);
        }

        // Version mismatches are detected and counted by the staleness pass
        // rather than filtered out at the index.
        filters
    }

    fn staleness_policy(&self) -> StalenessPolicy {
        StalenessPolicy::new(
            self.config.stale_tolerance_seconds,
            self.config.max_stale_age(),
            self.config.cache_version.clone(),
            self.config.enable_version_checking,
            self.config.enable_stale_while_revalidate,
            self.refresh_callback.is_some(),
        )
    }

    async fn apply_rerank(&self, prompt: &str, hits: Vec<SearchHit>) -> Vec<SearchHit> {
        let Some(ref reranker) = self.reranker else {
            return hits;
        };
        if hits.len() < 2 {
            return hits;
        }

        let documents: Vec<String> = hits.iter().map(|h| h.entry.prompt().to_string()).collect();

        match reranker.rerank(prompt, &documents).await {
            Ok(ranked) => {
                self.metrics.record_rerank();
                let mut slots: Vec<Option<SearchHit>> = hits.into_iter().map(Some).collect();
                let reordered: Vec<SearchHit> = ranked
                    .into_iter()
                    .filter_map(|doc| slots.get_mut(doc.index).and_then(|slot| slot.take()))
                    .collect();

                if reordered.is_empty() {
                    slots.into_iter().flatten().collect()
                } else {
                    reordered
                }
            }
            Err(e) => {
                warn!("Reranking failed: {}. Keeping vector order.", e);
                hits
            }
        }
    }

    fn record_context_hit(&self, scope: Option<&Scope>) {
        let Some(field) = self.config.hit_key_field() else {
            return;
        };

        let bucket = scope
            .and_then(|s| s.get(field))
            .map(|s| s.as_str())
            .unwrap_or("_none_");
        self.metrics.record_context_hit(bucket);
    }

    fn populate_l1(&self, l1_key: &str, entry: &CacheEntry) {
        if let Some(ref l1) = self.l1 {
            l1.put(
                l1_key,
                L1Entry::new(entry.entry_id(), entry.response(), entry.metadata().cloned()),
            );
        }
    }

    fn spawn_refresh(
        &self,
        l1_key: &str,
        prompt: &str,
        user_id: Option<&str>,
        scope: Option<&Scope>,
        entry: &CacheEntry,
    ) {
        let Some(callback) = self.refresh_callback.clone() else {
            return;
        };

        if !self.refresh.begin(l1_key) {
            debug!("Refresh already in flight for key {}", l1_key);
            return;
        }

        let manager = self.clone();
        let l1_key = l1_key.to_string();
        let prompt = prompt.to_string();
        let user_id = user_id.map(|s| s.to_string());
        let scope = scope.cloned();
        let tags = entry.tags().to_vec();
        let metadata = entry.metadata().cloned();

        // Detached on purpose: refresh outlives the request that noticed
        // the staleness.
        tokio::spawn(async move {
            let result = callback(
                prompt.clone(),
                user_id.clone(),
                scope.clone().unwrap_or_default(),
            )
            .await;

            match result {
                Ok(fresh) => {
                    let stored = manager
                        .store(
                            &prompt,
                            &fresh,
                            user_id.as_deref(),
                            scope.as_ref(),
                            if tags.is_empty() { None } else { Some(tags) },
                            metadata,
                        )
                        .await;

                    match stored {
                        Ok(entry_id) => {
                            info!(entry_id = %entry_id, "Background refresh completed")
                        }
                        Err(e) => warn!("Failed to store refreshed entry: {}", e),
                    }
                }
                Err(e) => warn!("Refresh callback failed: {}", e),
            }

            manager.refresh.finish(&l1_key);
        });
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
