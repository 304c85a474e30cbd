/// Query result cache
///
/// Cacheable directory reads (all users, lookup by email, lookup by reset
/// token, active/inactive counts) go through a [`QueryCache`]. Values are JSON
/// strings under string keys; every successful write calls
/// [`QueryCache::invalidate`], which advances the cache generation.
///
/// Readers take the generation before loading and hand it back to
/// [`QueryCache::put`]. A put carrying an older generation is dropped, so a
/// result loaded before a write is never stored after that write.
///
/// Cache failures are never surfaced to callers: implementations log them and
/// behave as a miss.
///
/// # Implementations
///
/// - [`MemoryQueryCache`]: per-process map with TTL
/// - [`redis::RedisQueryCache`]: shared Redis cache with generation-based invalidation
/// - [`NoopQueryCache`]: caching disabled
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use userdir_shared::cache::{MemoryQueryCache, QueryCache};
///
/// # async fn example() {
/// let cache = MemoryQueryCache::new(Duration::from_secs(60));
/// let generation = cache.generation().await.unwrap_or_default();
/// cache.put("users:count:active", "3".to_string(), generation).await;
/// assert_eq!(cache.get("users:count:active").await.as_deref(), Some("3"));
///
/// cache.invalidate().await;
/// assert!(cache.get("users:count:active").await.is_none());
///
/// // Loaded before the invalidation: dropped
/// cache.put("users:count:active", "3".to_string(), generation).await;
/// assert!(cache.get("users:count:active").await.is_none());
/// # }
/// ```

pub mod redis;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Default time-to-live for cached query results
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Read-through cache for query results
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Cached value for `key`, if present and fresh
    async fn get(&self, key: &str) -> Option<String>;

    /// Current generation, or `None` when nothing can be stored
    async fn generation(&self) -> Option<u64>;

    /// Stores `value` under `key` unless the cache has moved past `generation`
    async fn put(&self, key: &str, value: String, generation: u64);

    /// Drops every cached value and advances the generation
    async fn invalidate(&self);
}

/// Cache that never stores anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopQueryCache;

#[async_trait]
impl QueryCache for NoopQueryCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn generation(&self) -> Option<u64> {
        None
    }

    async fn put(&self, _key: &str, _value: String, _generation: u64) {}

    async fn invalidate(&self) {}
}

#[derive(Debug, Default)]
struct MemoryEntries {
    generation: u64,
    values: HashMap<String, (Instant, String)>,
}

/// In-process cache with a fixed TTL per entry
#[derive(Debug)]
pub struct MemoryQueryCache {
    ttl: Duration,
    entries: RwLock<MemoryEntries>,
}

impl MemoryQueryCache {
    /// Creates an empty cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(MemoryEntries::default()),
        }
    }

    /// Number of stored entries, fresh or not
    pub async fn len(&self) -> usize {
        self.entries.read().await.values.len()
    }

    /// Whether nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.values.is_empty()
    }
}

impl Default for MemoryQueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

#[async_trait]
impl QueryCache for MemoryQueryCache {
    async fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read().await;
            match entries.values.get(key) {
                Some((expires_at, value)) if *expires_at > Instant::now() => {
                    return Some(value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: evict so the map doesn't grow with dead keys
        self.entries.write().await.values.remove(key);
        None
    }

    async fn generation(&self) -> Option<u64> {
        Some(self.entries.read().await.generation)
    }

    async fn put(&self, key: &str, value: String, generation: u64) {
        let mut entries = self.entries.write().await;
        if entries.generation != generation {
            return;
        }
        let expires_at = Instant::now() + self.ttl;
        entries.values.insert(key.to_string(), (expires_at, value));
    }

    async fn invalidate(&self) {
        let mut entries = self.entries.write().await;
        entries.generation += 1;
        entries.values.clear();
    }
}
