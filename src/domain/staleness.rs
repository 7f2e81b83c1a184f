//! Freshness decisions for retrieved L2 candidates
//!
//! Pure logic: the manager feeds each candidate through [`StalenessPolicy::evaluate`]
//! and acts on the verdict (serve, serve-and-refresh, or discard with a
//! counted reason).

use crate::domain::CacheEntry;

/// Why a candidate was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Recorded version differs from the configured cache version
    VersionMismatch,
    /// Entry age is beyond what staleness tolerance allows
    TooStale,
}

/// Verdict for a single candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within TTL; serve as-is
    Fresh,
    /// Past TTL but servable; `refresh` requests a background revalidation
    Stale { refresh: bool },
    /// Do not serve
    Discard(DiscardReason),
}

/// Staleness and version rules applied to every L2 candidate.
///
/// The entry's own TTL defines expiry; `tolerance_seconds` extends serving
/// past it and `max_stale_seconds` is the hard ceiling. When
/// stale-while-revalidate is enabled without a refresh callback, entries
/// within tolerance are still served (nothing is scheduled); entries past
/// tolerance are discarded since nothing could revalidate them.
#[derive(Debug, Clone)]
pub struct StalenessPolicy {
    tolerance_seconds: u64,
    max_stale_seconds: u64,
    version: String,
    version_checking: bool,
    serve_stale: bool,
    has_refresh_callback: bool,
}

impl StalenessPolicy {
    pub fn new(
        tolerance_seconds: u64,
        max_stale_seconds: u64,
        version: impl Into<String>,
        version_checking: bool,
        serve_stale: bool,
        has_refresh_callback: bool,
    ) -> Self {
        Self {
            tolerance_seconds,
            max_stale_seconds,
            version: version.into(),
            version_checking,
            serve_stale,
            has_refresh_callback,
        }
    }

    pub fn evaluate(&self, entry: &CacheEntry, now: u64) -> Freshness {
        if self.version_checking && entry.version() != self.version {
            return Freshness::Discard(DiscardReason::VersionMismatch);
        }

        let age = entry.age_seconds(now);
        let ttl = entry.ttl_seconds();
        let schedule = self.serve_stale && self.has_refresh_callback;

        if age <= ttl {
            return Freshness::Fresh;
        }

        if age > self.max_stale_seconds.max(ttl) {
            return Freshness::Discard(DiscardReason::TooStale);
        }

        if age <= ttl + self.tolerance_seconds {
            return Freshness::Stale { refresh: schedule };
        }

        // Past tolerance but under the hard ceiling: only servable when a
        // refresh can actually be scheduled.
        if schedule {
            Freshness::Stale { refresh: true }
        } else {
            Freshness::Discard(DiscardReason::TooStale)
        }
    }
}
