//! Background refresh coordination
//!
//! At most one refresh is in flight per L1 key: `begin` is an
//! insert-if-absent on the in-flight set, and whoever spawned the task is
//! responsible for calling `finish` when it completes, success or not.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::domain::{CacheError, Scope};

/// Caller-supplied revalidation function: `(prompt, user_id, scope)` to a
/// fresh response.
pub type RefreshCallback = Arc<
    dyn Fn(String, Option<String>, Scope) -> BoxFuture<'static, Result<String, CacheError>>
        + Send
        + Sync,
>;

/// Tracks which L1 keys currently have a refresh task running.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    in_flight: Mutex<HashSet<String>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a key for refresh. `false` means a refresh is already running
    /// and the caller must not enqueue another.
    pub fn begin(&self, l1_key: &str) -> bool {
        self.in_flight.lock().insert(l1_key.to_string())
    }

    /// Release a key after the refresh task finishes.
    pub fn finish(&self, l1_key: &str) {
        self.in_flight.lock().remove(l1_key);
    }

    pub fn is_in_flight(&self, l1_key: &str) -> bool {
        self.in_flight.lock().contains(l1_key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}
