//! L2 vector backend contract

use std::collections::HashSet;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{CacheEntry, CacheError};

/// Equality predicates narrowing a vector search. `None` fields are
/// unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub user_id: Option<String>,
    pub scope_hash: Option<String>,
    pub version: Option<String>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_scope_hash(mut self, scope_hash: impl Into<String>) -> Self {
        self.scope_hash = Some(scope_hash.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.scope_hash.is_none() && self.version.is_none()
    }

    /// Whether an entry satisfies every set predicate
    pub fn matches(&self, entry: &CacheEntry) -> bool {
        if let Some(ref user_id) = self.user_id {
            if entry.user_id() != Some(user_id.as_str()) {
                return false;
            }
        }

        if let Some(ref scope_hash) = self.scope_hash {
            if entry.scope_hash() != Some(scope_hash.as_str()) {
                return false;
            }
        }

        if let Some(ref version) = self.version {
            if entry.version() != version {
                return false;
            }
        }

        true
    }
}

/// A search match with its cosine distance to the query vector
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entry: CacheEntry,
    pub distance: f32,
}

/// Cosine distance scaled to [0, 2]: 0 = identical direction, 2 = opposite.
///
/// Mismatched or empty vectors score as maximally distant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }

    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}

/// Contract over a vector-search-capable store.
///
/// Entries are discoverable by similarity plus equality filters; the set
/// operations carry the tag index. `retention` on writes is the physical
/// lifetime in the store, which exceeds the logical TTL when stale serving
/// is enabled.
#[async_trait]
pub trait VectorBackend: Send + Sync + Debug {
    /// Upsert an entry with its embedding
    async fn index_add(
        &self,
        entry: &CacheEntry,
        embedding: &[f32],
        retention: Duration,
    ) -> Result<(), CacheError>;

    /// Find entries within `distance_threshold` (inclusive) of `embedding`,
    /// narrowed by `filters`, ordered by increasing distance, at most `k`.
    async fn vector_search(
        &self,
        embedding: &[f32],
        filters: &SearchFilters,
        k: usize,
        distance_threshold: f32,
    ) -> Result<Vec<SearchHit>, CacheError>;

    /// Delete an entry by id; `true` if it existed
    async fn delete(&self, entry_id: &str) -> Result<bool, CacheError>;

    /// Whether an entry exists
    async fn exists(&self, entry_id: &str) -> Result<bool, CacheError>;

    /// Add a member to a set container
    async fn set_member_add(&self, set_key: &str, member: &str) -> Result<(), CacheError>;

    /// Remove a member from a set container
    async fn set_member_remove(&self, set_key: &str, member: &str) -> Result<(), CacheError>;

    /// Read all members of a set container
    async fn set_read(&self, set_key: &str) -> Result<HashSet<String>, CacheError>;

    /// Drop a set container entirely
    async fn set_clear(&self, set_key: &str) -> Result<(), CacheError>;

    /// Drop every entry and set owned by this cache
    async fn clear(&self) -> Result<(), CacheError>;
}
