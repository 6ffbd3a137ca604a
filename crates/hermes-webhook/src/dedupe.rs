//! Redelivery suppression keyed by `X-GitHub-Delivery`.
//!
//! GitHub redelivers a webhook when the first attempt times out, and a
//! redelivery keeps its delivery id. Ids are remembered for a fixed TTL in a
//! moka cache, which evicts expired ids on its own.

use std::time::Duration;

use moka::sync::Cache;

/// Concurrent set of recently seen delivery ids.
///
/// Clones share the same underlying set.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use hermes_webhook::dedupe::DeliveryCache;
///
/// let cache = DeliveryCache::new(Duration::from_secs(60));
/// assert!(cache.insert("72d3162e-cc78-11e3-81ab-4c9367dc0958"));
/// assert!(!cache.insert("72d3162e-cc78-11e3-81ab-4c9367dc0958"));
/// ```
#[derive(Clone)]
pub struct DeliveryCache {
    seen: Cache<String, ()>,
}

impl DeliveryCache {
    /// Remember ids for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: Cache::builder().time_to_live(ttl).build(),
        }
    }

    /// Record `id`; returns `false` if it was already seen within the TTL.
    ///
    /// Check and insert are a single atomic step, so two concurrent
    /// deliveries with the same id cannot both see `true`.
    pub fn insert(&self, id: &str) -> bool {
        self.seen.entry(id.to_string()).or_insert(()).is_fresh()
    }

    /// Drop `id` so a later redelivery is processed again.
    pub fn forget(&self, id: &str) {
        self.seen.invalidate(id);
    }

    /// Whether `id` is currently remembered.
    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains_key(id)
    }

    /// Number of ids currently remembered.
    pub fn len(&self) -> usize {
        self.seen.run_pending_tasks();
        self.seen.entry_count() as usize
    }

    /// Whether no ids are remembered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
