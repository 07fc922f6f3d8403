//! Deduplication store
//!
//! TTL-keyed idempotency cache gating every event-driven capability
//! invocation. A trigger that reaches the swarm twice must only be processed
//! once per TTL window, so the claim operation is atomic: exactly one caller
//! of `acquire_once` for a given key wins within the window.
//!
//! The store is process-local shared state. It is not safe for multi-instance
//! deployment without an external atomic claim primitive; that is a documented
//! trust boundary of the design, not something to patch with ad hoc locking.

use crate::config::DedupeConfig;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

/// One claim in the store. A key whose `expires_at` has passed is logically
/// absent even before cleanup physically removes it.
#[derive(Debug, Clone)]
struct DedupeEntry {
    first_seen: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, DedupeEntry>,
    /// Insertion order, for oldest-first eviction. May contain keys that were
    /// already removed from `entries`; eviction skips those.
    insertion_order: VecDeque<String>,
}

/// TTL-keyed idempotency cache
pub struct DedupeStore {
    inner: Mutex<Inner>,
    config: DedupeConfig,
}

impl DedupeStore {
    pub fn new(config: DedupeConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
        }
    }

    /// Check whether a key holds an unexpired claim, without claiming it.
    pub fn is_duplicate(&self, key: &str) -> bool {
        let now = Utc::now();
        let inner = self.inner.lock().expect("dedupe lock poisoned");
        inner
            .entries
            .get(key)
            .map(|e| e.expires_at > now)
            .unwrap_or(false)
    }

    /// Record a key as processed with the default TTL.
    pub fn mark_processed(&self, key: &str) {
        self.mark_processed_with_ttl(key, self.config.default_ttl_secs);
    }

    /// Record a key as processed with an explicit TTL.
    pub fn mark_processed_with_ttl(&self, key: &str, ttl_secs: u64) {
        let mut inner = self.inner.lock().expect("dedupe lock poisoned");
        Self::insert(&mut inner, key, ttl_secs);
        self.maybe_cleanup(&mut inner);
    }

    /// Atomic check-and-mark with the default TTL. Returns true only for the
    /// caller that should proceed; every other call within the TTL window
    /// returns false.
    pub fn acquire_once(&self, key: &str) -> bool {
        self.acquire_once_with_ttl(key, self.config.default_ttl_secs)
    }

    /// Atomic check-and-mark with an explicit TTL.
    pub fn acquire_once_with_ttl(&self, key: &str, ttl_secs: u64) -> bool {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("dedupe lock poisoned");

        if let Some(entry) = inner.entries.get(key) {
            if entry.expires_at > now {
                debug!(key, "dedupe: claim already held");
                return false;
            }
        }

        Self::insert(&mut inner, key, ttl_secs);
        self.maybe_cleanup(&mut inner);
        true
    }

    /// Number of physically stored entries (expired-but-uncollected included).
    pub fn len(&self) -> usize {
        self.inner.lock().expect("dedupe lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(inner: &mut Inner, key: &str, ttl_secs: u64) {
        let now = Utc::now();
        let entry = DedupeEntry {
            first_seen: now,
            expires_at: now + Duration::seconds(ttl_secs as i64),
        };
        if inner.entries.insert(key.to_string(), entry).is_some() {
            // Refreshed claim: drop the stale order slot so eviction age
            // matches the new claim, not the original one
            if let Some(pos) = inner.insertion_order.iter().position(|k| k == key) {
                inner.insertion_order.remove(pos);
            }
        }
        inner.insertion_order.push_back(key.to_string());
    }

    /// Lazy cleanup, triggered only past half capacity so the common path
    /// stays O(1). Expired entries go first; if the store is still over the
    /// hard cap, the oldest-inserted entries are evicted until it is not.
    /// This is eviction by insertion age, not strict LRU.
    fn maybe_cleanup(&self, inner: &mut Inner) {
        if inner.entries.len() <= self.config.max_entries / 2 {
            return;
        }

        let now = Utc::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.expires_at > now);
        inner
            .insertion_order
            .retain(|k| inner.entries.contains_key(k));

        while inner.entries.len() > self.config.max_entries {
            match inner.insertion_order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }

        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(removed, remaining = inner.entries.len(), "dedupe cleanup");
        }
    }

    /// Age of the first claim for a key, if present. Exposed for diagnostics.
    pub fn first_seen(&self, key: &str) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock().expect("dedupe lock poisoned");
        inner.entries.get(key).map(|e| e.first_seen)
    }
}

/// Derive the idempotency key for one trigger reaching one handler.
///
/// Keys are `event_id:capability[:discriminator]`. The discriminator is for
/// callers whose event ids are not globally unique: two structurally different
/// events sharing an id would otherwise collide. Event-driven dispatch passes
/// `None`; opt in with a content hash where duplicate ids are possible.
pub fn dedupe_key(event_id: &str, capability: &str, discriminator: Option<&str>) -> String {
    match discriminator {
        Some(d) => format!("{}:{}:{}", event_id, capability, d),
        None => format!("{}:{}", event_id, capability),
    }
}
