//! Recommendation Cache
//!
//! Time-bounded memoisation of finished result sets, keyed by a profile fingerprint.
//!
//! - one map from fingerprint to `(value, inserted_at)`; storing a key replaces it
//! - entries older than the TTL count as a miss and are dropped on that lookup
//! - over capacity, the single oldest-inserted entry is evicted (reads `peek`, so they never refresh it)

use serde::Serialize;
use sha2::{Digest, Sha256};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use super::profile::UserProfile;
use crate::error::Result;

/// Source of the current instant, swappable in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Cache counters for observability
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    /// Percentage, rounded to two decimals
    pub hit_rate_percent: f64,
    pub cache_size: usize,
}

pub struct RecommendationCache<V> {
    /// Reads use `peek`, so the LRU order stays insertion order
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> RecommendationCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self::with_clock(ttl, capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fresh value for `key`, counting the hit or miss
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let lookup = entries.peek(key).map(|entry| {
            (now.saturating_duration_since(entry.inserted_at) < self.ttl)
                .then(|| entry.value.clone())
        });
        let fresh = match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                entries.pop(key);
                debug!(key, "Cache entry expired");
                None
            }
            None => None,
        };
        drop(entries);

        match fresh {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("fitrec_cache_hits_total").increment(1);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("fitrec_cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Store `value`, replacing any previous entry for `key`
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let entry = CacheEntry {
            value,
            inserted_at: self.clock.now(),
        };
        let key = key.into();
        if let Some((evicted, _)) = self.lock().push(key.clone(), entry) {
            if evicted != key {
                debug!(key = %evicted, "Evicted oldest cache entry");
            }
        }
    }

    /// Return the cached value or compute, store and return a new one.
    /// Errors from `compute` are not cached.
    pub fn get_or_compute<E, F>(&self, key: &str, compute: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        CacheStats {
            hits,
            misses,
            total_requests: total,
            hit_rate_percent: hit_rate,
            cache_size: self.len(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hex SHA-256 digest of the profile plus any request options that change the result.
///
/// Profiles are hashed in struct field order, so the key order of the JSON a client
/// sent never matters. Goal order does: the first goal is the primary one.
pub fn fingerprint<O: Serialize>(profile: &UserProfile, options: &O) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(profile)?);
    hasher.update(b"\x1f");
    hasher.update(serde_json::to_vec(options)?);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(clock: Arc<ManualClock>, capacity: usize) -> RecommendationCache<u32> {
        RecommendationCache::with_clock(Duration::from_secs(3600), capacity, clock)
    }

    fn profile(goals: &[&str]) -> UserProfile {
        UserProfile {
            fitness_level: "Novice".to_string(),
            goals: goals.iter().map(|g| g.to_string()).collect(),
            equipment: "Full Gym".to_string(),
            preferred_duration: None,
            preferred_frequency: Some(3),
            preferred_style: None,
            user_id: None,
        }
    }

    #[test]
    fn test_hit_within_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache(clock.clone(), 10);
        cache.insert("k", 1);
        clock.advance(Duration::from_secs(3599));
        assert_eq!(cache.get("k"), Some(1));
    }

    #[test]
    fn test_expired_entry_is_a_miss_and_removed() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache(clock.clone(), 10);
        cache.insert("k", 1);
        clock.advance(Duration::from_secs(3600));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_get_or_compute_recomputes_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache(clock.clone(), 10);
        let mut calls = 0;
        let mut compute = || -> std::result::Result<u32, ()> {
            calls += 1;
            Ok(calls)
        };

        assert_eq!(cache.get_or_compute("k", &mut compute), Ok(1));
        assert_eq!(cache.get_or_compute("k", &mut compute), Ok(1));
        clock.advance(Duration::from_secs(3601));
        assert_eq!(cache.get_or_compute("k", &mut compute), Ok(2));
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = cache(Arc::new(ManualClock::new()), 10);
        let failed: std::result::Result<u32, &str> = cache.get_or_compute("k", || Err("boom"));
        assert!(failed.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evicts_oldest_inserted_not_least_recently_used() {
        let cache = cache(Arc::new(ManualClock::new()), 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // reading "a" must not protect it
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn test_restored_key_counts_as_newest() {
        let cache = cache(Arc::new(ManualClock::new()), 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 3);
        cache.insert("c", 4);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(3));
        assert_eq!(cache.get("c"), Some(4));
    }

    #[test]
    fn test_zero_capacity_holds_one_entry() {
        let cache = cache(Arc::new(ManualClock::new()), 0);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_store_replaces_existing_key() {
        let cache = cache(Arc::new(ManualClock::new()), 10);
        cache.insert("k", 1);
        cache.insert("k", 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn test_stats() {
        let cache = cache(Arc::new(ManualClock::new()), 10);
        cache.insert("k", 1);
        cache.get("k");
        cache.get("k");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.hit_rate_percent, 66.67);
        assert_eq!(stats.cache_size, 1);
    }

    #[test]
    fn test_fingerprint_ignores_json_key_order() {
        let a: UserProfile = serde_json::from_str(
            r#"{"fitness_level": "Novice", "goals": ["Strength"], "equipment": "Full Gym", "preferred_frequency": 3}"#,
        )
        .unwrap();
        let b: UserProfile = serde_json::from_str(
            r#"{"preferred_frequency": 3, "equipment": "Full Gym", "goals": ["Strength"], "fitness_level": "Novice"}"#,
        )
        .unwrap();
        let key = fingerprint(&a, &()).unwrap();
        assert_eq!(key, fingerprint(&b, &()).unwrap());
        assert_eq!(key, fingerprint(&profile(&["Strength"]), &()).unwrap());
        assert_eq!(key.len(), 64);
    }

    #[test]
    fn test_fingerprint_keeps_goal_order() {
        let a = fingerprint(&profile(&["Strength", "Weight Loss"]), &()).unwrap();
        let b = fingerprint(&profile(&["Weight Loss", "Strength"]), &()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_changes_with_profile_and_options() {
        let base = fingerprint(&profile(&["Strength"]), &5u32).unwrap();
        assert_ne!(base, fingerprint(&profile(&["Endurance"]), &5u32).unwrap());
        assert_ne!(base, fingerprint(&profile(&["Strength"]), &10u32).unwrap());
    }
}
