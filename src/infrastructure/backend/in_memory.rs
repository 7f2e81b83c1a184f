//! In-memory vector backend
//!
//! Linear-scan cosine search over a hash map. Suitable for development,
//! tests and small single-process deployments; production uses
//! [`RedisVectorBackend`](super::redis::RedisVectorBackend).

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{
    cosine_distance, now_unix, CacheEntry, CacheError, SearchFilters, SearchHit, VectorBackend,
};

#[derive(Debug, Clone)]
struct StoredRecord {
    entry: CacheEntry,
    embedding: Vec<f32>,
    /// Physical expiry (unix seconds); past this the record is gone even for
    /// stale serving
    retained_until: u64,
    /// Insertion sequence, so equal-distance matches resolve newest-first
    seq: u64,
}

/// In-memory [`VectorBackend`] using linear search.
#[derive(Debug, Default)]
pub struct InMemoryVectorBackend {
    records: RwLock<HashMap<String, StoredRecord>>,
    sets: RwLock<HashMap<String, HashSet<String>>>,
    seq: RwLock<u64>,
}

impl InMemoryVectorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err<T>(e: std::sync::PoisonError<T>) -> CacheError {
        CacheError::backend(format!("Failed to acquire lock: {}", e))
    }
}

#[async_trait]
impl VectorBackend for InMemoryVectorBackend {
    async fn index_add(
        &self,
        entry: &CacheEntry,
        embedding: &[f32],
        retention: Duration,
    ) -> Result<(), CacheError> {
        let seq = {
            let mut seq = self.seq.write().map_err(Self::lock_err)?;
            *seq += 1;
            *seq
        };

        let mut records = self.records.write().map_err(Self::lock_err)?;
        records.insert(
            entry.entry_id().to_string(),
            StoredRecord {
                entry: entry.clone(),
                embedding: embedding.to_vec(),
                retained_until: now_unix() + retention.as_secs(),
                seq,
            },
        );

        Ok(())
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        filters: &SearchFilters,
        k: usize,
        distance_threshold: f32,
    ) -> Result<Vec<SearchHit>, CacheError> {
        let records = self.records.read().map_err(Self::lock_err)?;
        let now = now_unix();

        let mut hits: Vec<(SearchHit, u64)> = records
            .values()
            .filter(|record| record.retained_until > now)
            .filter(|record| filters.matches(&record.entry))
            .map(|record| {
                (
                    SearchHit {
                        entry: record.entry.clone(),
                        distance: cosine_distance(embedding, &record.embedding),
                    },
                    record.seq,
                )
            })
            .filter(|(hit, _)| hit.distance <= distance_threshold)
            .collect();

        // Ascending distance; equal distances newest-first so the latest
        // write wins under identical prompts
        hits.sort_by(|(a, sa), (b, sb)| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(sb.cmp(sa))
        });
        hits.truncate(k);

        Ok(hits.into_iter().map(|(hit, _)| hit).collect())
    }

    async fn delete(&self, entry_id: &str) -> Result<bool, CacheError> {
        let mut records = self.records.write().map_err(Self::lock_err)?;
        Ok(records.remove(entry_id).is_some())
    }

    async fn exists(&self, entry_id: &str) -> Result<bool, CacheError> {
        let records = self.records.read().map_err(Self::lock_err)?;
        Ok(records
            .get(entry_id)
            .map(|r| r.retained_until > now_unix())
            .unwrap_or(false))
    }

    async fn set_member_add(&self, set_key: &str, member: &str) -> Result<(), CacheError> {
        let mut sets = self.sets.write().map_err(Self::lock_err)?;
        sets.entry(set_key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_member_remove(&self, set_key: &str, member: &str) -> Result<(), CacheError> {
        let mut sets = self.sets.write().map_err(Self::lock_err)?;
        if let Some(set) = sets.get_mut(set_key) {
            set.remove(member);
            if set.is_empty() {
                sets.remove(set_key);
            }
        }
        Ok(())
    }

    async fn set_read(&self, set_key: &str) -> Result<HashSet<String>, CacheError> {
        let sets = self.sets.read().map_err(Self::lock_err)?;
        Ok(sets.get(set_key).cloned().unwrap_or_default())
    }

    async fn set_clear(&self, set_key: &str) -> Result<(), CacheError> {
        let mut sets = self.sets.write().map_err(Self::lock_err)?;
        sets.remove(set_key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.records.write().map_err(Self::lock_err)?.clear();
        self.sets.write().map_err(Self::lock_err)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, prompt: &str, response: &str) -> CacheEntry {
        CacheEntry::restore(
            id,
            prompt,
            response,
            None,
            None,
            vec![],
            None,
            now_unix(),
            3600,
            "v1",
        )
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_add_and_search() {
        let backend = InMemoryVectorBackend::new();
        backend
            .index_add(&entry("sem:1", "q", "r"), &[1.0, 0.0], HOUR)
            .await
            .unwrap();

        let hits = backend
            .vector_search(&[1.0, 0.0], &SearchFilters::new(), 1, 0.2)
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.entry_id(), "sem:1");
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_orders_by_distance() {
        let backend = InMemoryVectorBackend::new();
        backend
            .index_add(&entry("sem:far", "q1", "r1"), &[0.6, 0.8], HOUR)
            .await
            .unwrap();
        backend
            .index_add(&entry("sem:near", "q2", "r2"), &[0.99, 0.14], HOUR)
            .await
            .unwrap();

        let hits = backend
            .vector_search(&[1.0, 0.0], &SearchFilters::new(), 10, 2.0)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry.entry_id(), "sem:near");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let backend = InMemoryVectorBackend::new();
        backend
            .index_add(&entry("sem:orth", "q", "r"), &[0.0, 1.0], HOUR)
            .await
            .unwrap();

        // Orthogonal vectors sit at distance exactly 1.0
        let hits = backend
            .vector_search(&[1.0, 0.0], &SearchFilters::new(), 1, 1.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let hits = backend
            .vector_search(&[1.0, 0.0], &SearchFilters::new(), 1, 0.999)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_zero_threshold_exact_match_only() {
        let backend = InMemoryVectorBackend::new();
        backend
            .index_add(&entry("sem:1", "q", "r"), &[1.0, 0.0], HOUR)
            .await
            .unwrap();

        let hits = backend
            .vector_search(&[1.0, 0.0], &SearchFilters::new(), 1, 0.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let hits = backend
            .vector_search(&[0.99, 0.14], &SearchFilters::new(), 1, 0.0)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_filters_narrow_results() {
        let backend = InMemoryVectorBackend::new();
        backend
            .index_add(
                &entry("sem:alice", "q", "ra").with_user_id("alice"),
                &[1.0, 0.0],
                HOUR,
            )
            .await
            .unwrap();
        backend
            .index_add(
                &entry("sem:bob", "q", "rb").with_user_id("bob"),
                &[1.0, 0.0],
                HOUR,
            )
            .await
            .unwrap();

        let hits = backend
            .vector_search(
                &[1.0, 0.0],
                &SearchFilters::new().with_user_id("alice"),
                10,
                0.2,
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.entry_id(), "sem:alice");
    }

    #[tokio::test]
    async fn test_equal_distance_prefers_newest() {
        let backend = InMemoryVectorBackend::new();
        backend
            .index_add(&entry("sem:old", "q", "old"), &[1.0, 0.0], HOUR)
            .await
            .unwrap();
        backend
            .index_add(&entry("sem:new", "q", "new"), &[1.0, 0.0], HOUR)
            .await
            .unwrap();

        let hits = backend
            .vector_search(&[1.0, 0.0], &SearchFilters::new(), 1, 0.2)
            .await
            .unwrap();

        assert_eq!(hits[0].entry.response(), "new");
    }

    #[tokio::test]
    async fn test_physical_retention() {
        let backend = InMemoryVectorBackend::new();
        backend
            .index_add(&entry("sem:gone", "q", "r"), &[1.0, 0.0], Duration::ZERO)
            .await
            .unwrap();

        let hits = backend
            .vector_search(&[1.0, 0.0], &SearchFilters::new(), 1, 2.0)
            .await
            .unwrap();

        assert!(hits.is_empty());
        assert!(!backend.exists("sem:gone").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_and_exists() {
        let backend = InMemoryVectorBackend::new();
        backend
            .index_add(&entry("sem:1", "q", "r"), &[1.0], HOUR)
            .await
            .unwrap();

        assert!(backend.exists("sem:1").await.unwrap());
        assert!(backend.delete("sem:1").await.unwrap());
        assert!(!backend.delete("sem:1").await.unwrap());
        assert!(!backend.exists("sem:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_operations() {
        let backend = InMemoryVectorBackend::new();
        backend.set_member_add("tag:a", "sem:1").await.unwrap();
        backend.set_member_add("tag:a", "sem:2").await.unwrap();

        let members = backend.set_read("tag:a").await.unwrap();
        assert_eq!(members.len(), 2);

        backend.set_member_remove("tag:a", "sem:1").await.unwrap();
        let members = backend.set_read("tag:a").await.unwrap();
        assert_eq!(members.len(), 1);

        backend.set_clear("tag:a").await.unwrap();
        assert!(backend.set_read("tag:a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let backend = InMemoryVectorBackend::new();
        backend
            .index_add(&entry("sem:1", "q", "r"), &[1.0], HOUR)
            .await
            .unwrap();
        backend.set_member_add("tag:a", "sem:1").await.unwrap();

        backend.clear().await.unwrap();

        assert!(!backend.exists("sem:1").await.unwrap());
        assert!(backend.set_read("tag:a").await.unwrap().is_empty());
    }
}
