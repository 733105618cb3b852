//! Time-bounded result cache
//!
//! Successful tool results are memoized under a [`CacheKey`]: the SHA-256 of
//! the tool id and the canonical JSON encoding of its parameters (object keys
//! sorted recursively), so `{"a":1,"b":2}` and `{"b":2,"a":1}` share a key.
//!
//! Entries live in independently locked shards; lookups on keys in different
//! shards never contend. Expired entries are dropped lazily on read and
//! eagerly by [`ResultCache::sweep`]. `max_entries` bounds the whole cache:
//! when it is exceeded, expired entries go first, then the least recently
//! inserted live entry across all shards. In-flight calls for the same key
//! are not coalesced: two concurrent misses both invoke the tool.

use crate::tools::Parameters;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL used by [`ResultCache::put_default`]
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Upper bound on entries across all shards (None = bounded by TTL only)
    pub max_entries: Option<usize>,

    /// Number of independently locked shards
    pub shards: usize,

    /// Interval of the background sweeper
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_entries: Some(1024),
            shards: 16,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Deterministic key for a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn new(tool_id: &str, params: &Parameters) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tool_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical_json(params).as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn shard_index(&self, shards: usize) -> usize {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        (u64::from_le_bytes(prefix) % shards as u64) as usize
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Canonical JSON encoding of parameters (recursively sorted object keys)
pub fn canonical_json(params: &Parameters) -> String {
    let mut out = String::new();
    write_object(params, &mut out);
    out
}

fn write_object(map: &serde_json::Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_value(&map[key], out);
    }
    out.push('}');
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    inserted_at: Instant,
    ttl: Duration,
    sequence: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) > self.ttl
    }
}

#[derive(Debug, Default)]
struct Shard {
    entries: HashMap<CacheKey, CacheEntry>,
}

impl Shard {
    fn oldest(&self) -> Option<(u64, CacheKey)> {
        self.entries
            .iter()
            .min_by_key(|(_, entry)| entry.sequence)
            .map(|(key, entry)| (entry.sequence, *key))
    }
}

/// Sharded TTL cache for tool results
#[derive(Debug)]
pub struct ResultCache {
    shards: Vec<Mutex<Shard>>,
    /// Live count; only changed while holding the affected shard's lock
    entries: AtomicUsize,
    next_sequence: AtomicU64,
    config: CacheConfig,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        let shard_count = config.shards.max(1);

        Self {
            shards: (0..shard_count).map(|_| Mutex::new(Shard::default())).collect(),
            entries: AtomicUsize::new(0),
            next_sequence: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn shard(&self, key: &CacheKey) -> &Mutex<Shard> {
        &self.shards[key.shard_index(self.shards.len())]
    }

    /// Get a live entry, dropping it if it has expired
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = Instant::now();
        let mut shard = self.shard(key).lock();

        let expired = match shard.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired && shard.entries.remove(key).is_some() {
            self.entries.fetch_sub(1, Ordering::AcqRel);
        }
        None
    }

    /// Store a value for `ttl`; a zero TTL stores nothing
    pub fn put(&self, key: CacheKey, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        {
            let mut shard = self.shard(&key).lock();
            let replaced = shard
                .entries
                .insert(
                    key,
                    CacheEntry {
                        value,
                        inserted_at: Instant::now(),
                        ttl,
                        sequence,
                    },
                )
                .is_some();
            if !replaced {
                self.entries.fetch_add(1, Ordering::AcqRel);
            }
        }

        self.enforce_limit();
    }

    fn over_limit(&self, limit: usize) -> bool {
        self.entries.load(Ordering::Acquire) > limit
    }

    /// Bring the cache back under `max_entries`
    ///
    /// Called without any shard lock held; eviction locks one shard at a time.
    fn enforce_limit(&self) {
        let Some(limit) = self.config.max_entries else {
            return;
        };
        if !self.over_limit(limit) {
            return;
        }

        let swept = self.sweep();
        if swept > 0 {
            tracing::trace!(swept, "Dropped expired entries to make room");
        }
        while self.over_limit(limit) {
            if !self.evict_oldest() {
                break;
            }
        }
    }

    /// Remove the least recently inserted entry across all shards
    ///
    /// Returns false when the cache is empty.
    fn evict_oldest(&self) -> bool {
        let oldest = self
            .shards
            .iter()
            .enumerate()
            .filter_map(|(index, shard)| shard.lock().oldest().map(|(seq, key)| (seq, index, key)))
            .min_by_key(|(seq, _, _)| *seq);
        let Some((sequence, index, key)) = oldest else {
            return false;
        };

        // The entry may have been replaced or removed since the scan
        let mut shard = self.shards[index].lock();
        if shard.entries.get(&key).is_some_and(|entry| entry.sequence == sequence) {
            shard.entries.remove(&key);
            self.entries.fetch_sub(1, Ordering::AcqRel);
        }
        true
    }

    /// Store a value with the configured default TTL
    pub fn put_default(&self, key: CacheKey, value: Value) {
        self.put(key, value, self.config.default_ttl);
    }

    /// Remove an entry
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut shard = self.shard(key).lock();
        let removed = shard.entries.remove(key).is_some();
        if removed {
            self.entries.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Drop every expired entry, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        self.shards
            .iter()
            .map(|shard| {
                let mut shard = shard.lock();
                let before = shard.entries.len();
                shard.entries.retain(|_, entry| !entry.is_expired(now));
                let removed = before - shard.entries.len();
                self.entries.fetch_sub(removed, Ordering::AcqRel);
                removed
            })
            .sum()
    }

    /// Number of stored entries (expired ones included until swept)
    pub fn len(&self) -> usize {
        self.entries.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            let mut shard = shard.lock();
            self.entries.fetch_sub(shard.entries.len(), Ordering::AcqRel);
            shard.entries.clear();
        }
    }

    /// Spawn a task that sweeps every `sweep_interval`
    ///
    /// The task holds only a weak reference and exits when the cache is
    /// dropped or `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.sweep_interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(strong) = cache.upgrade() else {
                    break;
                };
                let removed = strong.sweep();
                if removed > 0 {
                    tracing::debug!(removed, remaining = strong.len(), "Swept expired cache entries");
                }
            }
            tracing::trace!("Cache sweeper stopped");
        })
    }
}
