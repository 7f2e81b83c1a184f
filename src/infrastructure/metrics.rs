//! Cache metrics registry and Prometheus exposition
//!
//! Counters are atomics; latency accumulators are add-and-count atomic
//! pairs, so averages tolerate the usual small-window skew. The labelled
//! context and tag maps sit behind a read-write lock.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

/// Per-layer breakdown in a [`MetricsSnapshot`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct LayerSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_percentage: f64,
    pub avg_latency_ms: f64,
}

/// Staleness breakdown in a [`MetricsSnapshot`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct StalenessSnapshot {
    pub stale_served: u64,
    pub stale_refused: u64,
    pub version_mismatches: u64,
    pub average_stale_age_seconds: f64,
}

/// Point-in-time export of every cache metric
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_queries: u64,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub hit_rate_percentage: f64,
    pub llm_calls_avoided: u64,
    pub rerank_operations: u64,
    pub l1: LayerSnapshot,
    pub l2: LayerSnapshot,
    pub context_hits: HashMap<String, u64>,
    pub tag_invalidations: HashMap<String, u64>,
    pub staleness: StalenessSnapshot,
    pub timestamp: String,
}

/// Thread-safe metrics registry for cache performance.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    total_queries: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    rerank_operations: AtomicU64,

    l1_hits: AtomicU64,
    l1_misses: AtomicU64,
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,

    l1_latency_us: AtomicU64,
    l1_latency_count: AtomicU64,
    l2_latency_us: AtomicU64,
    l2_latency_count: AtomicU64,

    stale_served: AtomicU64,
    stale_refused: AtomicU64,
    version_mismatches: AtomicU64,
    stale_age_seconds_total: AtomicU64,

    context_hits: RwLock<HashMap<String, u64>>,
    tag_invalidations: RwLock<HashMap<String, u64>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rerank(&self) {
        self.rerank_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l1_hit(&self, latency: Duration) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
        self.l1_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.l1_latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l1_miss(&self) {
        self.l1_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_hit(&self, latency: Duration) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
        self.l2_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.l2_latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_miss(&self) {
        self.l2_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_context_hit(&self, bucket: &str) {
        let mut buckets = self.context_hits.write();
        *buckets.entry(bucket.to_string()).or_insert(0) += 1;
    }

    pub fn record_tag_invalidation(&self, tag: &str, count: u64) {
        let mut tags = self.tag_invalidations.write();
        *tags.entry(tag.to_string()).or_insert(0) += count;
    }

    pub fn record_stale_served(&self, age_seconds: u64) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
        self.stale_age_seconds_total
            .fetch_add(age_seconds, Ordering::Relaxed);
    }

    pub fn record_stale_refused(&self) {
        self.stale_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_version_mismatch(&self) {
        self.version_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset every counter to zero
    pub fn reset(&self) {
        self.total_queries.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.rerank_operations.store(0, Ordering::Relaxed);
        self.l1_hits.store(0, Ordering::Relaxed);
        self.l1_misses.store(0, Ordering::Relaxed);
        self.l2_hits.store(0, Ordering::Relaxed);
        self.l2_misses.store(0, Ordering::Relaxed);
        self.l1_latency_us.store(0, Ordering::Relaxed);
        self.l1_latency_count.store(0, Ordering::Relaxed);
        self.l2_latency_us.store(0, Ordering::Relaxed);
        self.l2_latency_count.store(0, Ordering::Relaxed);
        self.stale_served.store(0, Ordering::Relaxed);
        self.stale_refused.store(0, Ordering::Relaxed);
        self.version_mismatches.store(0, Ordering::Relaxed);
        self.stale_age_seconds_total.store(0, Ordering::Relaxed);
        self.context_hits.write().clear();
        self.tag_invalidations.write().clear();
    }

    fn rate_pct(numerator: u64, denominator: u64) -> f64 {
        if denominator == 0 {
            0.0
        } else {
            numerator as f64 / denominator as f64 * 100.0
        }
    }

    fn avg_latency_ms(total_us: u64, count: u64) -> f64 {
        if count == 0 {
            0.0
        } else {
            total_us as f64 / count as f64 / 1000.0
        }
    }

    /// Export all metrics as a serializable snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_queries = self.total_queries.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let l1_hits = self.l1_hits.load(Ordering::Relaxed);
        let l1_misses = self.l1_misses.load(Ordering::Relaxed);
        let l2_hits = self.l2_hits.load(Ordering::Relaxed);
        let l2_misses = self.l2_misses.load(Ordering::Relaxed);
        let stale_served = self.stale_served.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_queries,
            hits,
            misses,
            errors,
            hit_rate_percentage: Self::rate_pct(hits, total_queries),
            llm_calls_avoided: hits,
            rerank_operations: self.rerank_operations.load(Ordering::Relaxed),
            l1: LayerSnapshot {
                hits: l1_hits,
                misses: l1_misses,
                hit_rate_percentage: Self::rate_pct(l1_hits, l1_hits + l1_misses),
                avg_latency_ms: Self::avg_latency_ms(
                    self.l1_latency_us.load(Ordering::Relaxed),
                    self.l1_latency_count.load(Ordering::Relaxed),
                ),
            },
            l2: LayerSnapshot {
                hits: l2_hits,
                misses: l2_misses,
                hit_rate_percentage: Self::rate_pct(l2_hits, l2_hits + l2_misses),
                avg_latency_ms: Self::avg_latency_ms(
                    self.l2_latency_us.load(Ordering::Relaxed),
                    self.l2_latency_count.load(Ordering::Relaxed),
                ),
            },
            context_hits: self.context_hits.read().clone(),
            tag_invalidations: self.tag_invalidations.read().clone(),
            staleness: StalenessSnapshot {
                stale_served,
                stale_refused: self.stale_refused.load(Ordering::Relaxed),
                version_mismatches: self.version_mismatches.load(Ordering::Relaxed),
                average_stale_age_seconds: if stale_served == 0 {
                    0.0
                } else {
                    self.stale_age_seconds_total.load(Ordering::Relaxed) as f64
                        / stale_served as f64
                },
            },
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Render metrics in Prometheus text exposition format.
    ///
    /// `detailed` gates the L1/L2, context and tag families.
    pub fn to_prometheus(&self, prefix: &str, detailed: bool) -> String {
        let snap = self.snapshot();
        let mut out = String::new();

        write_counter(
            &mut out,
            prefix,
            "queries_total",
            "Total number of cache queries",
            snap.total_queries,
        );
        write_counter(
            &mut out,
            prefix,
            "hits_total",
            "Total number of cache hits",
            snap.hits,
        );
        write_counter(
            &mut out,
            prefix,
            "misses_total",
            "Total number of cache misses",
            snap.misses,
        );
        write_counter(
            &mut out,
            prefix,
            "errors_total",
            "Total number of errors",
            snap.errors,
        );
        write_counter(
            &mut out,
            prefix,
            "llm_calls_avoided",
            "Total LLM calls avoided",
            snap.llm_calls_avoided,
        );
        write_gauge(
            &mut out,
            prefix,
            "hit_rate",
            "Cache hit rate percentage",
            snap.hit_rate_percentage,
        );

        if detailed {
            write_counter(
                &mut out,
                prefix,
                "l1_hits_total",
                "Total L1 cache hits",
                snap.l1.hits,
            );
            write_counter(
                &mut out,
                prefix,
                "l1_misses_total",
                "Total L1 cache misses",
                snap.l1.misses,
            );
            write_counter(
                &mut out,
                prefix,
                "l2_hits_total",
                "Total L2 cache hits",
                snap.l2.hits,
            );
            write_counter(
                &mut out,
                prefix,
                "l2_misses_total",
                "Total L2 cache misses",
                snap.l2.misses,
            );
            write_gauge(
                &mut out,
                prefix,
                "l1_hit_rate",
                "L1 cache hit rate percentage",
                snap.l1.hit_rate_percentage,
            );
            write_gauge(
                &mut out,
                prefix,
                "l2_hit_rate",
                "L2 cache hit rate percentage",
                snap.l2.hit_rate_percentage,
            );
            write_gauge(
                &mut out,
                prefix,
                "l1_latency_ms",
                "Average L1 latency in milliseconds",
                snap.l1.avg_latency_ms,
            );
            write_gauge(
                &mut out,
                prefix,
                "l2_latency_ms",
                "Average L2 latency in milliseconds",
                snap.l2.avg_latency_ms,
            );

            write_labelled_counter(
                &mut out,
                prefix,
                "context_hits_total",
                "Cache hits by context type",
                "context_type",
                &snap.context_hits,
            );
            write_labelled_counter(
                &mut out,
                prefix,
                "tag_invalidations_total",
                "Entries invalidated by tag",
                "tag",
                &snap.tag_invalidations,
            );
        }

        write_counter(
            &mut out,
            prefix,
            "stale_served_total",
            "Stale entries served",
            snap.staleness.stale_served,
        );
        write_counter(
            &mut out,
            prefix,
            "stale_refused_total",
            "Stale entries refused",
            snap.staleness.stale_refused,
        );
        write_counter(
            &mut out,
            prefix,
            "version_mismatches_total",
            "Version mismatches detected",
            snap.staleness.version_mismatches,
        );
        write_counter(
            &mut out,
            prefix,
            "rerank_operations_total",
            "Total rerank operations",
            snap.rerank_operations,
        );

        out
    }
}

fn write_counter(out: &mut String, prefix: &str, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {prefix}_{name} {help}");
    let _ = writeln!(out, "# TYPE {prefix}_{name} counter");
    let _ = writeln!(out, "{prefix}_{name} {value}");
    let _ = writeln!(out);
}

fn write_gauge(out: &mut String, prefix: &str, name: &str, help: &str, value: f64) {
    let _ = writeln!(out, "# HELP {prefix}_{name} {help}");
    let _ = writeln!(out, "# TYPE {prefix}_{name} gauge");
    let _ = writeln!(out, "{prefix}_{name} {value}");
    let _ = writeln!(out);
}

fn write_labelled_counter(
    out: &mut String,
    prefix: &str,
    name: &str,
    help: &str,
    label: &str,
    values: &HashMap<String, u64>,
) {
    if values.is_empty() {
        return;
    }

    let _ = writeln!(out, "# HELP {prefix}_{name} {help}");
    let _ = writeln!(out, "# TYPE {prefix}_{name} counter");

    let mut sorted: Vec<_> = values.iter().collect();
    sorted.sort();
    for (key, count) in sorted {
        let _ = writeln!(out, "{prefix}_{name}{{{label}=\"{key}\"}} {count}");
    }
    let _ = writeln!(out);
}
