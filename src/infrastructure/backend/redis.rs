//! Redis vector backend
//!
//! Stores entries as hashes under `<name>:entry:<id>` with an f32 blob
//! field, indexed by a RediSearch vector index named `<name>`. Similarity
//! lookups run `FT.SEARCH` with a `VECTOR_RANGE` clause so the distance
//! threshold is enforced at the database, and tag-typed fields carry the
//! user/scope/version filters.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::domain::{CacheEntry, CacheError, SearchFilters, SearchHit, VectorBackend};

/// Fields returned from a search, everything except the embedding blob
const RETURN_FIELDS: &[&str] = &[
    "id",
    "prompt",
    "response",
    "user_id",
    "scope_hash",
    "version",
    "tags",
    "metadata",
    "created_at",
    "ttl",
    "distance",
];

/// RediSearch-backed [`VectorBackend`].
#[derive(Clone)]
pub struct RedisVectorBackend {
    connection: ConnectionManager,
    name: String,
    timeout: Duration,
    dims: Option<usize>,
    index_ready: std::sync::Arc<AtomicBool>,
}

impl fmt::Debug for RedisVectorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisVectorBackend")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisVectorBackend {
    /// Connect and prepare the index for the given cache configuration.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| CacheError::backend(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to connect to Redis: {}", e)))?;

        let backend = Self {
            connection,
            name: config.name.clone(),
            timeout: config.redis_timeout(),
            dims: config.vectorizer.dims,
            index_ready: std::sync::Arc::new(AtomicBool::new(false)),
        };

        if config.overwrite {
            backend.drop_index().await;
        }

        // With known dimensions the index can be created eagerly; otherwise
        // it is bootstrapped from the first written embedding.
        if let Some(dims) = backend.dims {
            backend.ensure_index(dims).await?;
        }

        Ok(backend)
    }

    fn entry_key(&self, entry_id: &str) -> String {
        format!("{}:entry:{}", self.name, entry_id)
    }

    async fn with_timeout<T, F>(&self, operation: &str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, redis::RedisError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => {
                result.map_err(|e| CacheError::backend(format!("{} failed: {}", operation, e)))
            }
            Err(_) => Err(CacheError::timeout(operation.to_string())),
        }
    }

    async fn drop_index(&self) {
        let mut conn = self.connection.clone();
        let result = redis::cmd("FT.DROPINDEX")
            .arg(&self.name)
            .arg("DD")
            .query_async::<()>(&mut conn)
            .await;

        if let Err(e) = result {
            debug!("FT.DROPINDEX {}: {}", self.name, e);
        }
    }

    async fn ensure_index(&self, dims: usize) -> Result<(), CacheError> {
        if self.index_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut conn = self.connection.clone();
        let prefix = format!("{}:entry:", self.name);

        let result = redis::cmd("FT.CREATE")
            .arg(&self.name)
            .arg("ON")
            .arg("HASH")
            .arg("PREFIX")
            .arg(1)
            .arg(&prefix)
            .arg("SCHEMA")
            .arg("id")
            .arg("TAG")
            .arg("prompt")
            .arg("TEXT")
            .arg("response")
            .arg("TEXT")
            .arg("user_id")
            .arg("TAG")
            .arg("scope_hash")
            .arg("TAG")
            .arg("version")
            .arg("TAG")
            .arg("tags")
            .arg("TAG")
            .arg("metadata")
            .arg("TEXT")
            .arg("created_at")
            .arg("NUMERIC")
            .arg("ttl")
            .arg("NUMERIC")
            .arg("embedding")
            .arg("VECTOR")
            .arg("FLAT")
            .arg(6)
            .arg("TYPE")
            .arg("FLOAT32")
            .arg("DIM")
            .arg(dims)
            .arg("DISTANCE_METRIC")
            .arg("COSINE")
            .query_async::<()>(&mut conn)
            .await;

        match result {
            Ok(()) => {
                debug!("Created index {} (dims={})", self.name, dims);
                self.index_ready.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) if e.to_string().contains("Index already exists") => {
                self.index_ready.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => Err(CacheError::backend(format!(
                "Failed to create index {}: {}",
                self.name, e
            ))),
        }
    }

    fn embedding_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn build_query(filters: &SearchFilters) -> String {
        let range = "@embedding:[VECTOR_RANGE $radius $vec]=>{$YIELD_DISTANCE_AS: distance}";

        let mut parts = Vec::new();
        if let Some(ref user_id) = filters.user_id {
            parts.push(format!("@user_id:{{{}}}", escape_tag_value(user_id)));
        }
        if let Some(ref scope_hash) = filters.scope_hash {
            parts.push(format!("@scope_hash:{{{}}}", escape_tag_value(scope_hash)));
        }
        if let Some(ref version) = filters.version {
            parts.push(format!("@version:{{{}}}", escape_tag_value(version)));
        }

        if parts.is_empty() {
            range.to_string()
        } else {
            format!("({}) {}", parts.join(" "), range)
        }
    }
}

/// Escape a value for a RediSearch TAG clause
fn escape_tag_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        if c.is_alphanumeric() {
            escaped.push(c);
        } else {
            escaped.push('\\');
            escaped.push(c);
        }
    }

    escaped
}

fn value_to_string(value: &redis::Value) -> Option<String> {
    match value {
        redis::Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        redis::Value::SimpleString(s) => Some(s.clone()),
        redis::Value::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

fn parse_document(fields: &[redis::Value]) -> Option<(CacheEntry, f32)> {
    let mut map: HashMap<String, String> = HashMap::new();

    for pair in fields.chunks(2) {
        if let [name, value] = pair {
            if let (Some(name), Some(value)) = (value_to_string(name), value_to_string(value)) {
                map.insert(name, value);
            }
        }
    }

    let distance: f32 = map.get("distance")?.parse().ok()?;
    let tags: Vec<String> = map
        .get("tags")
        .filter(|t| !t.is_empty())
        .map(|t| t.split(',').map(|s| s.to_string()).collect())
        .unwrap_or_default();
    let metadata = map
        .get("metadata")
        .filter(|m| !m.is_empty())
        .and_then(|m| serde_json::from_str(m).ok());

    let entry = CacheEntry::restore(
        map.get("id")?.clone(),
        map.get("prompt").cloned().unwrap_or_default(),
        map.get("response").cloned().unwrap_or_default(),
        map.get("user_id").filter(|v| !v.is_empty()).cloned(),
        map.get("scope_hash").filter(|v| !v.is_empty()).cloned(),
        tags,
        metadata,
        map.get("created_at").and_then(|v| v.parse().ok())?,
        map.get("ttl").and_then(|v| v.parse().ok())?,
        map.get("version").cloned().unwrap_or_default(),
    );

    Some((entry, distance))
}

fn parse_search_reply(reply: redis::Value) -> Vec<SearchHit> {
    let items = match reply {
        redis::Value::Array(items) => items,
        _ => return Vec::new(),
    };

    let mut hits = Vec::new();
    // Reply layout: [total, key1, fields1, key2, fields2, ...]
    let mut iter = items.into_iter().skip(1);

    while let (Some(_key), Some(fields)) = (iter.next(), iter.next()) {
        if let redis::Value::Array(fields) = fields {
            if let Some((entry, distance)) = parse_document(&fields) {
                hits.push(SearchHit { entry, distance });
            } else {
                warn!("Skipping unparsable search document");
            }
        }
    }

    hits
}

#[async_trait]
impl VectorBackend for RedisVectorBackend {
    async fn index_add(
        &self,
        entry: &CacheEntry,
        embedding: &[f32],
        retention: Duration,
    ) -> Result<(), CacheError> {
        self.ensure_index(self.dims.unwrap_or(embedding.len())).await?;

        let key = self.entry_key(entry.entry_id());
        let blob = Self::embedding_blob(embedding);

        let mut pipe = redis::pipe();
        let mut hset = pipe.cmd("HSET");
        hset = hset
            .arg(&key)
            .arg("id")
            .arg(entry.entry_id())
            .arg("prompt")
            .arg(entry.prompt())
            .arg("response")
            .arg(entry.response())
            .arg("version")
            .arg(entry.version())
            .arg("tags")
            .arg(entry.tags().join(","))
            .arg("created_at")
            .arg(entry.created_at())
            .arg("ttl")
            .arg(entry.ttl_seconds())
            .arg("embedding")
            .arg(&blob);

        if let Some(user_id) = entry.user_id() {
            hset = hset.arg("user_id").arg(user_id);
        }
        if let Some(scope_hash) = entry.scope_hash() {
            hset = hset.arg("scope_hash").arg(scope_hash);
        }
        if let Some(metadata) = entry.metadata() {
            let json = serde_json::to_string(metadata)
                .map_err(|e| CacheError::serialization(format!("metadata: {}", e)))?;
            hset = hset.arg("metadata").arg(json);
        }

        hset.ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(retention.as_secs().max(1))
            .ignore();

        let mut conn = self.connection.clone();
        self.with_timeout("redis index_add", pipe.query_async::<()>(&mut conn))
            .await
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        filters: &SearchFilters,
        k: usize,
        distance_threshold: f32,
    ) -> Result<Vec<SearchHit>, CacheError> {
        let query = Self::build_query(filters);
        let blob = Self::embedding_blob(embedding);
        let mut conn = self.connection.clone();

        let mut cmd = redis::cmd("FT.SEARCH");
        cmd.arg(&self.name)
            .arg(&query)
            .arg("PARAMS")
            .arg(4)
            .arg("radius")
            .arg(distance_threshold)
            .arg("vec")
            .arg(&blob)
            .arg("RETURN")
            .arg(RETURN_FIELDS.len())
            .arg(RETURN_FIELDS)
            .arg("SORTBY")
            .arg("distance")
            .arg("ASC")
            .arg("LIMIT")
            .arg(0)
            .arg(k)
            .arg("DIALECT")
            .arg(2);

        let reply = match tokio::time::timeout(
            self.timeout,
            cmd.query_async::<redis::Value>(&mut conn),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            // A cache that has never been written to has no index yet
            Ok(Err(e)) if e.to_string().to_lowercase().contains("no such index") => {
                return Ok(Vec::new());
            }
            Ok(Err(e)) => {
                return Err(CacheError::backend(format!("redis vector_search failed: {}", e)));
            }
            Err(_) => return Err(CacheError::timeout("redis vector_search")),
        };

        Ok(parse_search_reply(reply))
    }

    async fn delete(&self, entry_id: &str) -> Result<bool, CacheError> {
        let key = self.entry_key(entry_id);
        let mut conn = self.connection.clone();

        let deleted: i64 = self
            .with_timeout("redis delete", conn.del(&key))
            .await?;

        Ok(deleted > 0)
    }

    async fn exists(&self, entry_id: &str) -> Result<bool, CacheError> {
        let key = self.entry_key(entry_id);
        let mut conn = self.connection.clone();

        self.with_timeout("redis exists", conn.exists(&key)).await
    }

    async fn set_member_add(&self, set_key: &str, member: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();

        self.with_timeout("redis set_member_add", conn.sadd(set_key, member))
            .await
    }

    async fn set_member_remove(&self, set_key: &str, member: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();

        self.with_timeout("redis set_member_remove", conn.srem(set_key, member))
            .await
    }

    async fn set_read(&self, set_key: &str) -> Result<HashSet<String>, CacheError> {
        let mut conn = self.connection.clone();

        self.with_timeout("redis set_read", conn.smembers(set_key))
            .await
    }

    async fn set_clear(&self, set_key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();

        let _: i64 = self
            .with_timeout("redis set_clear", conn.del(set_key))
            .await?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let pattern = format!("{}:*", self.name);
        let mut conn = self.connection.clone();
        let mut cursor = 0u64;

        // SCAN rather than KEYS, as in any production deployment
        loop {
            let (new_cursor, keys): (u64, Vec<String>) = self
                .with_timeout(
                    "redis scan",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn),
                )
                .await?;

            if !keys.is_empty() {
                let _: i64 = self.with_timeout("redis del", conn.del(&keys)).await?;
            }

            cursor = new_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(())
    }
}
