//! Cache entry record stored in the L2 tier

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::CacheError;

/// Current unix time in seconds
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A prompt/response pair cached in the L2 tier.
///
/// The embedding travels alongside the entry into the backend but is not
/// part of the record itself; the backend owns vector storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unique identifier for this entry
    entry_id: String,
    /// Original prompt text (kept for observability and reranking)
    prompt: String,
    /// The cached response
    response: String,
    /// Tenant qualifier, absent for shared entries
    user_id: Option<String>,
    /// Scope qualifier, absent when context hashing is disabled
    scope_hash: Option<String>,
    /// Tags for group invalidation
    tags: Vec<String>,
    /// Caller-provided metadata
    metadata: Option<serde_json::Value>,
    /// Unix seconds at creation
    created_at: u64,
    /// Logical time-to-live in seconds
    ttl_seconds: u64,
    /// Cache version recorded at creation
    version: String,
}

impl CacheEntry {
    /// Create a new entry with a generated id and the current timestamp.
    pub fn new(
        prompt: impl Into<String>,
        response: impl Into<String>,
        ttl_seconds: u64,
        version: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: format!("sem:{}", Uuid::new_v4()),
            prompt: prompt.into(),
            response: response.into(),
            user_id: None,
            scope_hash: None,
            tags: Vec::new(),
            metadata: None,
            created_at: now_unix(),
            ttl_seconds,
            version: version.into(),
        }
    }

    /// Reconstruct an entry from stored fields (backend deserialization).
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        entry_id: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
        user_id: Option<String>,
        scope_hash: Option<String>,
        tags: Vec<String>,
        metadata: Option<serde_json::Value>,
        created_at: u64,
        ttl_seconds: u64,
        version: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            prompt: prompt.into(),
            response: response.into(),
            user_id,
            scope_hash,
            tags,
            metadata,
            created_at,
            ttl_seconds,
            version: version.into(),
        }
    }

    /// Set the user qualifier
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the scope qualifier
    pub fn with_scope_hash(mut self, scope_hash: impl Into<String>) -> Self {
        self.scope_hash = Some(scope_hash.into());
        self
    }

    /// Set the tag list
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set caller metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn scope_hash(&self) -> Option<&str> {
        self.scope_hash.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Age of the entry at `now`, saturating for clock skew
    pub fn age_seconds(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }

    /// Whether the entry is past its logical expiry at `now`
    pub fn is_expired(&self, now: u64) -> bool {
        self.age_seconds(now) > self.ttl_seconds
    }

    /// Deserialize the response as a typed value
    pub fn deserialize_response<T: for<'de> Deserialize<'de>>(&self) -> Result<T, CacheError> {
        serde_json::from_str(&self.response)
            .map_err(|e| CacheError::serialization(format!("Failed to decode response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new("what is rust?", "a systems language", 3600, "v1");

        assert!(entry.entry_id().starts_with("sem:"));
        assert_eq!(entry.prompt(), "what is rust?");
        assert_eq!(entry.response(), "a systems language");
        assert_eq!(entry.ttl_seconds(), 3600);
        assert_eq!(entry.version(), "v1");
        assert!(entry.user_id().is_none());
        assert!(entry.scope_hash().is_none());
        assert!(entry.tags().is_empty());
    }

    #[test]
    fn test_entry_qualifiers() {
        let entry = CacheEntry::new("q", "r", 60, "v1")
            .with_user_id("user-1")
            .with_scope_hash("abc123")
            .with_tags(vec!["brand:apple".into()])
            .with_metadata(serde_json::json!({"source": "test"}));

        assert_eq!(entry.user_id(), Some("user-1"));
        assert_eq!(entry.scope_hash(), Some("abc123"));
        assert_eq!(entry.tags(), &["brand:apple".to_string()]);
        assert!(entry.metadata().is_some());
    }

    #[test]
    fn test_entry_ids_are_unique() {
        let a = CacheEntry::new("q", "r", 60, "v1");
        let b = CacheEntry::new("q", "r", 60, "v1");

        assert_ne!(a.entry_id(), b.entry_id());
    }

    #[test]
    fn test_age_and_expiry() {
        let entry = CacheEntry::restore(
            "sem:fixed",
            "q",
            "r",
            None,
            None,
            vec![],
            None,
            1_000,
            300,
            "v1",
        );

        assert_eq!(entry.age_seconds(1_100), 100);
        assert!(!entry.is_expired(1_300));
        assert!(entry.is_expired(1_301));
        // Clock skew saturates rather than underflowing
        assert_eq!(entry.age_seconds(500), 0);
    }

    #[test]
    fn test_deserialize_response() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Payload {
            answer: String,
        }

        let entry = CacheEntry::new("q", r#"{"answer": "Paris"}"#, 60, "v1");
        let payload: Payload = entry.deserialize_response().unwrap();

        assert_eq!(payload.answer, "Paris");
    }
}
