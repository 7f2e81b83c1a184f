//! Tag index over L2 set containers
//!
//! One set per tag holds entry ids; one reverse set per entry holds its
//! tags, so a deleted entry can be scrubbed from every tag it belongs to.
//! Writes across multiple tags are not atomic and readers must tolerate
//! members pointing at entries that no longer exist.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{CacheError, VectorBackend};

/// Reverse mapping tag → entry ids, maintained in the L2 store.
#[derive(Debug, Clone)]
pub struct TagIndex {
    backend: Arc<dyn VectorBackend>,
    name: String,
}

impl TagIndex {
    pub fn new(backend: Arc<dyn VectorBackend>, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
        }
    }

    fn tag_set_key(&self, tag: &str) -> String {
        format!("{}:tag:{}", self.name, tag)
    }

    fn entry_tags_key(&self, entry_id: &str) -> String {
        format!("{}:entry-tags:{}", self.name, entry_id)
    }

    /// Register an entry under each tag.
    pub async fn attach(&self, entry_id: &str, tags: &[String]) -> Result<(), CacheError> {
        for tag in tags {
            self.backend
                .set_member_add(&self.tag_set_key(tag), entry_id)
                .await?;
            self.backend
                .set_member_add(&self.entry_tags_key(entry_id), tag)
                .await?;
        }

        debug!(entry_id, ?tags, "Attached tags");
        Ok(())
    }

    /// Current entry ids under a tag.
    pub async fn resolve(&self, tag: &str) -> Result<HashSet<String>, CacheError> {
        self.backend.set_read(&self.tag_set_key(tag)).await
    }

    /// Entry ids under any (`match_all = false`) or all (`match_all = true`)
    /// of the given tags.
    pub async fn resolve_many(
        &self,
        tags: &[String],
        match_all: bool,
    ) -> Result<HashSet<String>, CacheError> {
        let mut combined: Option<HashSet<String>> = None;

        for tag in tags {
            let members = self.resolve(tag).await?;
            combined = Some(match combined {
                None => members,
                Some(acc) if match_all => acc.intersection(&members).cloned().collect(),
                Some(acc) => acc.union(&members).cloned().collect(),
            });
        }

        Ok(combined.unwrap_or_default())
    }

    /// Remove an entry from every tag set it belongs to.
    pub async fn remove_entry(&self, entry_id: &str) -> Result<(), CacheError> {
        let reverse_key = self.entry_tags_key(entry_id);
        let tags = self.backend.set_read(&reverse_key).await?;

        for tag in &tags {
            self.backend
                .set_member_remove(&self.tag_set_key(tag), entry_id)
                .await?;
        }

        self.backend.set_clear(&reverse_key).await
    }

    /// Drop a tag's set entirely.
    pub async fn clear_tag(&self, tag: &str) -> Result<(), CacheError> {
        self.backend.set_clear(&self.tag_set_key(tag)).await
    }
}
