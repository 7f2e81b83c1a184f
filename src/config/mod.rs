//! Cache configuration schema
//!
//! Everything is serde-deserializable with sensible defaults, so a config
//! can come from code (builder methods), a file, or `SEMANTIC_CACHE_*`
//! environment variables via [`CacheConfig::from_env`].

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::CacheError;

/// Eviction policy for the L1 tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Evict the entry least recently accessed
    #[default]
    Recency,
    /// Evict the entry with the lowest access count, ties broken by recency
    Frequency,
    /// Evict expired entries first, then the oldest insertion
    Age,
}

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorizerProvider {
    #[default]
    HuggingFace,
    OpenAi,
    Cohere,
    VertexAi,
    VoyageAi,
}

/// Supported reranker providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankerProvider {
    #[default]
    HuggingFace,
    Cohere,
    VoyageAi,
}

/// Span exporter choice for distributed tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracingExporter {
    #[default]
    Console,
    Otlp,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Configuration for the embedding vectorizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizerConfig {
    #[serde(default)]
    pub provider: VectorizerProvider,

    #[serde(default = "default_vectorizer_model")]
    pub model: String,

    /// Embedding dimensions; auto-detected from known models when absent
    #[serde(default)]
    pub dims: Option<usize>,

    /// Provider credentials and endpoints (api_key, base_url, ...)
    #[serde(default)]
    pub api_config: HashMap<String, String>,
}

fn default_vectorizer_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            provider: VectorizerProvider::default(),
            model: default_vectorizer_model(),
            dims: None,
            api_config: HashMap::new(),
        }
    }
}

/// Configuration for the optional result reranker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub provider: RerankerProvider,

    #[serde(default = "default_reranker_model")]
    pub model: String,

    /// Maximum candidates surviving the rerank pass
    #[serde(default = "default_reranker_limit")]
    pub limit: usize,

    #[serde(default)]
    pub api_config: HashMap<String, String>,
}

fn default_reranker_model() -> String {
    "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string()
}

fn default_reranker_limit() -> usize {
    3
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: RerankerProvider::default(),
            model: default_reranker_model(),
            limit: default_reranker_limit(),
            api_config: HashMap::new(),
        }
    }
}

/// Configuration for the L1 in-memory tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L1CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_l1_max_size")]
    pub max_size: usize,

    #[serde(default = "default_l1_ttl_seconds")]
    pub ttl_seconds: u64,

    #[serde(default)]
    pub eviction_strategy: EvictionStrategy,
}

fn default_l1_max_size() -> usize {
    1000
}

fn default_l1_ttl_seconds() -> u64 {
    300
}

impl Default for L1CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_size: default_l1_max_size(),
            ttl_seconds: default_l1_ttl_seconds(),
            eviction_strategy: EvictionStrategy::default(),
        }
    }
}

/// Observability and monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Emit the L1/L2, context and tag metric breakdowns
    #[serde(default = "default_true")]
    pub enable_detailed_metrics: bool,

    #[serde(default = "default_metrics_prefix")]
    pub metrics_prefix: String,

    #[serde(default)]
    pub enable_tracing: bool,

    #[serde(default)]
    pub tracing_exporter: TracingExporter,

    /// Collector endpoint for the OTLP exporter
    #[serde(default)]
    pub tracing_endpoint: Option<String>,

    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_metrics_prefix() -> String {
    "semantic_cache".to_string()
}

fn default_service_name() -> String {
    "semantic-cache".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_detailed_metrics: true,
            metrics_prefix: default_metrics_prefix(),
            enable_tracing: false,
            tracing_exporter: TracingExporter::default(),
            tracing_endpoint: None,
            service_name: default_service_name(),
        }
    }
}

/// Top-level cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis connection URL for the L2 tier
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Cache name, used as the index name and key prefix
    #[serde(default = "default_name")]
    pub name: String,

    /// Default entry TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u64,

    /// Drop and recreate the index on connect if the schema changed
    #[serde(default)]
    pub overwrite: bool,

    /// Maximum cosine distance (scaled to [0, 2]) accepted as a hit
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,

    /// Candidates retrieved per lookup before reranking
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub vectorizer: VectorizerConfig,

    #[serde(default)]
    pub reranker: RerankerConfig,

    #[serde(default)]
    pub l1_cache: L1CacheConfig,

    /// Hash scope attributes into an L2 filter field
    #[serde(default = "default_true")]
    pub enable_context_hashing: bool,

    /// Scope attribute allowlist; anything else is ignored
    #[serde(default = "default_context_fields")]
    pub context_fields: Vec<String>,

    /// Scope attribute keying per-bucket hit metrics; defaults to the first
    /// entry of `context_fields`
    #[serde(default)]
    pub context_hit_key_field: Option<String>,

    #[serde(default = "default_true")]
    pub enable_tags: bool,

    #[serde(default = "default_max_tags")]
    pub max_tags_per_entry: usize,

    /// Serve recently-expired entries while refreshing in the background
    #[serde(default)]
    pub enable_stale_while_revalidate: bool,

    /// How long past TTL an entry stays servable without a refresh path
    #[serde(default)]
    pub stale_tolerance_seconds: u64,

    /// Hard ceiling on served staleness; defaults to `ttl`
    #[serde(default)]
    pub max_stale_age_seconds: Option<u64>,

    #[serde(default)]
    pub enable_version_checking: bool,

    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Concurrency cap for batch lookups; defaults to the batch size
    #[serde(default)]
    pub batch_concurrency: Option<usize>,

    #[serde(default = "default_redis_timeout_secs")]
    pub redis_timeout_secs: u64,

    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_name() -> String {
    "semantic_cache".to_string()
}

fn default_ttl() -> u64 {
    3600
}

fn default_distance_threshold() -> f32 {
    0.2
}

fn default_top_k() -> usize {
    1
}

fn default_context_fields() -> Vec<String> {
    vec![
        "conversation_id".to_string(),
        "user_persona".to_string(),
        "session_id".to_string(),
    ]
}

fn default_max_tags() -> usize {
    10
}

fn default_cache_version() -> String {
    "v1".to_string()
}

fn default_redis_timeout_secs() -> u64 {
    5
}

fn default_embed_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_base_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            name: default_name(),
            ttl: default_ttl(),
            overwrite: false,
            distance_threshold: default_distance_threshold(),
            top_k: default_top_k(),
            vectorizer: VectorizerConfig::default(),
            reranker: RerankerConfig::default(),
            l1_cache: L1CacheConfig::default(),
            enable_context_hashing: true,
            context_fields: default_context_fields(),
            context_hit_key_field: None,
            enable_tags: true,
            max_tags_per_entry: default_max_tags(),
            enable_stale_while_revalidate: false,
            stale_tolerance_seconds: 0,
            max_stale_age_seconds: None,
            enable_version_checking: false,
            cache_version: default_cache_version(),
            batch_concurrency: None,
            redis_timeout_secs: default_redis_timeout_secs(),
            embed_timeout_secs: default_embed_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_base_ms: default_retry_backoff_base_ms(),
            observability: ObservabilityConfig::default(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl CacheConfig {
    /// Create a configuration pointing at the given Redis URL
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from `SEMANTIC_CACHE_*` environment variables.
    ///
    /// Nested fields use `__` as a separator, e.g.
    /// `SEMANTIC_CACHE_L1_CACHE__ENABLED=true`.
    pub fn from_env() -> Result<Self, CacheError> {
        let loaded = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("SEMANTIC_CACHE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CacheError::configuration(format!("Failed to read environment: {}", e)))?;

        let config: Self = loaded
            .try_deserialize()
            .map_err(|e| CacheError::configuration(format!("Invalid configuration: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_distance_threshold(mut self, threshold: f32) -> Self {
        self.distance_threshold = threshold;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_vectorizer(mut self, vectorizer: VectorizerConfig) -> Self {
        self.vectorizer = vectorizer;
        self
    }

    pub fn with_reranker(mut self, reranker: RerankerConfig) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn with_l1_cache(mut self, l1_cache: L1CacheConfig) -> Self {
        self.l1_cache = l1_cache;
        self
    }

    pub fn with_context_fields(mut self, fields: Vec<String>) -> Self {
        self.context_fields = fields;
        self
    }

    pub fn with_tags_enabled(mut self, enabled: bool) -> Self {
        self.enable_tags = enabled;
        self
    }

    pub fn with_max_tags_per_entry(mut self, max: usize) -> Self {
        self.max_tags_per_entry = max;
        self
    }

    pub fn with_version_checking(mut self, version: impl Into<String>) -> Self {
        self.enable_version_checking = true;
        self.cache_version = version.into();
        self
    }

    pub fn with_stale_while_revalidate(
        mut self,
        tolerance_seconds: u64,
        max_stale_age_seconds: u64,
    ) -> Self {
        self.enable_stale_while_revalidate = true;
        self.stale_tolerance_seconds = tolerance_seconds;
        self.max_stale_age_seconds = Some(max_stale_age_seconds);
        self
    }

    pub fn with_observability(mut self, observability: ObservabilityConfig) -> Self {
        self.observability = observability;
        self
    }

    /// Per-call Redis deadline
    pub fn redis_timeout(&self) -> Duration {
        Duration::from_secs(self.redis_timeout_secs)
    }

    /// Per-call embedding deadline
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }

    /// Hard staleness ceiling, defaulting to the TTL
    pub fn max_stale_age(&self) -> u64 {
        self.max_stale_age_seconds.unwrap_or(self.ttl)
    }

    /// Scope attribute keying per-bucket hit metrics
    pub fn hit_key_field(&self) -> Option<&str> {
        self.context_hit_key_field
            .as_deref()
            .or_else(|| self.context_fields.first().map(|s| s.as_str()))
    }

    /// Candidates to retrieve per lookup: `top_k`, widened to the reranker
    /// limit when reranking is on
    pub fn effective_top_k(&self) -> usize {
        if self.reranker.enabled {
            self.top_k.max(self.reranker.limit)
        } else {
            self.top_k
        }
        .max(1)
    }

    /// Reject inconsistent configurations
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.redis_url.is_empty() {
            return Err(CacheError::configuration("redis_url must not be empty"));
        }

        if self.name.is_empty() {
            return Err(CacheError::configuration("name must not be empty"));
        }

        if !(0.0..=2.0).contains(&self.distance_threshold) {
            return Err(CacheError::configuration(
                "distance_threshold must be within [0.0, 2.0]",
            ));
        }

        if self.l1_cache.enabled && self.l1_cache.max_size == 0 {
            return Err(CacheError::configuration(
                "l1_cache.max_size must be positive when the L1 tier is enabled",
            ));
        }

        if self.reranker.enabled && self.reranker.limit == 0 {
            return Err(CacheError::configuration(
                "reranker.limit must be positive when reranking is enabled",
            ));
        }

        if self.enable_version_checking && self.cache_version.is_empty() {
            return Err(CacheError::configuration(
                "cache_version must not be empty when version checking is enabled",
            ));
        }

        if let Some(max_stale) = self.max_stale_age_seconds {
            if max_stale < self.ttl {
                return Err(CacheError::configuration(
                    "max_stale_age_seconds must be at least the TTL",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = CacheConfig::default();

        assert_eq!(config.name, "semantic_cache");
        assert_eq!(config.ttl, 3600);
        assert!(!config.overwrite);
        assert!((config.distance_threshold - 0.2).abs() < 1e-6);
        assert_eq!(config.top_k, 1);
        assert!(!config.l1_cache.enabled);
        assert_eq!(config.l1_cache.max_size, 1000);
        assert_eq!(config.l1_cache.ttl_seconds, 300);
        assert_eq!(config.l1_cache.eviction_strategy, EvictionStrategy::Recency);
        assert!(config.enable_context_hashing);
        assert_eq!(
            config.context_fields,
            vec!["conversation_id", "user_persona", "session_id"]
        );
        assert!(config.enable_tags);
        assert_eq!(config.max_tags_per_entry, 10);
        assert!(!config.enable_stale_while_revalidate);
        assert_eq!(config.stale_tolerance_seconds, 0);
        assert_eq!(config.max_stale_age(), config.ttl);
        assert!(!config.enable_version_checking);
        assert_eq!(config.cache_version, "v1");
        assert_eq!(config.redis_timeout(), Duration::from_secs(5));
        assert_eq!(config.embed_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff_base_ms, 100);
        assert_eq!(config.observability.metrics_prefix, "semantic_cache");
        assert!(config.observability.enable_detailed_metrics);
        assert!(!config.observability.enable_tracing);

        config.validate().unwrap();
    }

    #[test]
    fn test_hit_key_field_defaults_to_first_context_field() {
        let config = CacheConfig::default();
        assert_eq!(config.hit_key_field(), Some("conversation_id"));

        let config = CacheConfig::default()
            .with_context_fields(vec!["persona".to_string(), "session".to_string()]);
        assert_eq!(config.hit_key_field(), Some("persona"));

        let mut config = CacheConfig::default();
        config.context_hit_key_field = Some("session_id".to_string());
        assert_eq!(config.hit_key_field(), Some("session_id"));

        let config = CacheConfig::default().with_context_fields(vec![]);
        assert_eq!(config.hit_key_field(), None);
    }

    #[test]
    fn test_effective_top_k() {
        let config = CacheConfig::default();
        assert_eq!(config.effective_top_k(), 1);

        let mut reranker = RerankerConfig::default();
        reranker.enabled = true;
        reranker.limit = 5;
        let config = CacheConfig::default().with_reranker(reranker);
        assert_eq!(config.effective_top_k(), 5);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let config = CacheConfig::default().with_distance_threshold(2.5);
        assert!(config.validate().is_err());

        let config = CacheConfig::default().with_distance_threshold(-0.1);
        assert!(config.validate().is_err());

        let config = CacheConfig::default().with_distance_threshold(0.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let config = CacheConfig::default().with_name("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_l1_capacity() {
        let mut l1 = L1CacheConfig::default();
        l1.enabled = true;
        l1.max_size = 0;

        let config = CacheConfig::default().with_l1_cache(l1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_max_stale_below_ttl() {
        let mut config = CacheConfig::default();
        config.ttl = 3600;
        config.max_stale_age_seconds = Some(100);

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enum_serde_spellings() {
        assert_eq!(
            serde_json::to_string(&EvictionStrategy::Recency).unwrap(),
            "\"recency\""
        );
        assert_eq!(
            serde_json::from_str::<EvictionStrategy>("\"frequency\"").unwrap(),
            EvictionStrategy::Frequency
        );
        assert_eq!(
            serde_json::to_string(&VectorizerProvider::VertexAi).unwrap(),
            "\"vertexai\""
        );
        assert_eq!(
            serde_json::from_str::<RerankerProvider>("\"voyageai\"").unwrap(),
            RerankerProvider::VoyageAi
        );
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("SEMANTIC_CACHE_NAME", "env_cache");
        std::env::set_var("SEMANTIC_CACHE_TTL", "120");
        std::env::set_var("SEMANTIC_CACHE_L1_CACHE__ENABLED", "true");

        let config = CacheConfig::from_env().unwrap();

        assert_eq!(config.name, "env_cache");
        assert_eq!(config.ttl, 120);
        assert!(config.l1_cache.enabled);

        std::env::remove_var("SEMANTIC_CACHE_NAME");
        std::env::remove_var("SEMANTIC_CACHE_TTL");
        std::env::remove_var("SEMANTIC_CACHE_L1_CACHE__ENABLED");
    }
}
