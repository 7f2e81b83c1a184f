//! Semantic response cache for LLM applications
//!
//! A two-tier cache that returns previously-computed responses for prompts
//! that are *semantically similar* (not merely byte-equal) to earlier
//! queries, with support for:
//! - L1 (in-process) and L2 (Redis vector search) tiers with write-through
//! - Multi-tenant isolation by user id and hashed scope attributes
//! - Tag-based group invalidation
//! - Staleness tolerance with background refresh (stale-while-revalidate)
//! - Version-based invalidation across deployments
//! - Pluggable embedding and reranking providers
//!
//! # Example
//!
//! ```rust,no_run
//! use semantic_cache::{CacheConfig, SemanticCacheManager};
//!
//! # async fn example() -> Result<(), semantic_cache::CacheError> {
//! let mut config = CacheConfig::new("redis://127.0.0.1:6379");
//! config.vectorizer.api_config.insert("api_key".into(), "sk-...".into());
//!
//! let cache = SemanticCacheManager::connect(config).await?;
//!
//! if let Some(response) = cache.check("What is the capital of France?", None, None).await {
//!     println!("cached: {}", response);
//! } else {
//!     // Call the LLM, then store the fresh response
//!     cache.store("What is the capital of France?", "Paris", None, None, None, None).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod infrastructure;

pub use crate::config::{
    CacheConfig, EvictionStrategy, L1CacheConfig, LogFormat, ObservabilityConfig, RerankerConfig,
    RerankerProvider, TracingExporter, VectorizerConfig, VectorizerProvider,
};
pub use crate::domain::{
    CacheEntry, CacheError, RankedDocument, Reranker, Scope, SearchFilters, SearchHit,
    VectorBackend, Vectorizer,
};
pub use crate::infrastructure::backend::{InMemoryVectorBackend, RedisVectorBackend};
pub use crate::infrastructure::l1::L1Stats;
pub use crate::infrastructure::logging::init_logging;
pub use crate::infrastructure::manager::{CacheQuery, SemanticCacheManager};
pub use crate::infrastructure::metrics::MetricsSnapshot;
pub use crate::infrastructure::observability::{init_tracing, shutdown_tracing};
pub use crate::infrastructure::refresh::RefreshCallback;
pub use crate::infrastructure::rerankers::RerankerFactory;
pub use crate::infrastructure::vectorizers::VectorizerFactory;
