//! Caching for reads and pending-state for writes, shared by every worker.
//!
//! Reads go through a `QueryCache`: a fresh entry is served without touching the backend. Writes
//! don't invalidate anything, so a new post only shows up in the feed once the cached feed goes
//! stale.
use crate::backend::structs::SessionSecret;
use crate::config::Config;
use crate::models::{Post, User};
use crate::twoface::{Cause, ExternalError, Fallible, TfError};
use lru::LruCache;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache key of the home feed.
pub const RECENT_POSTS: &str = "recent-posts";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock can't leave a map half-written, so keep going.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Results of one kind of query, keyed by the query's arguments. Holds at most `capacity`
/// entries, dropping the least recently used one to make room.
pub struct QueryCache<K: Hash + Eq, V> {
    entries: Arc<Mutex<LruCache<K, (Instant, V)>>>,
    stale_time: Duration,
}

impl<K: Hash + Eq, V> Clone for QueryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            stale_time: self.stale_time,
        }
    }
}

impl<K: Hash + Eq, V> fmt::Debug for QueryCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = lock(&self.entries);
        f.debug_struct("QueryCache")
            .field("len", &entries.len())
            .field("cap", &entries.cap())
            .field("stale_time", &self.stale_time)
            .finish()
    }
}

impl<K: Eq + Hash + Clone + fmt::Debug, V: Clone> QueryCache<K, V> {
    pub fn new(capacity: usize, stale_time: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            stale_time,
        }
    }

    /// The cached value, unless it's gone stale. A stale entry is dropped.
    pub fn get_fresh(&self, key: &K) -> Option<V> {
        let mut entries = lock(&self.entries);
        let stale = match entries.get(key) {
            Some((fetched_at, value)) if fetched_at.elapsed() < self.stale_time => {
                return Some(value.clone())
            }
            Some(_) => true,
            None => false,
        };
        if stale {
            debug!(?key, "dropping stale query");
            entries.pop(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        lock(&self.entries).put(key, (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &K) {
        lock(&self.entries).pop(key);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Serve a fresh cached value, or run `fetch` and cache what it returns. Errors aren't cached.
    pub async fn fetch<F, Fut>(&self, key: K, fetch: F) -> Fallible<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Fallible<V>>,
    {
        if let Some(value) = self.get_fresh(&key) {
            debug!(?key, "query cache hit");
            return Ok(value);
        }
        let value = fetch().await?;
        self.insert(key, value.clone());
        Ok(value)
    }
}

/// The kinds of write a user can have in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreatePost,
    Like,
    Save,
}

/// One user's write against one target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MutationKey {
    pub kind: MutationKind,
    pub user_id: String,
    pub target: String,
}

impl MutationKey {
    pub fn new(kind: MutationKind, user_id: &str, target: &str) -> Self {
        Self {
            kind,
            user_id: user_id.to_owned(),
            target: target.to_owned(),
        }
    }
}

/// Tracks writes in flight, so a double-click can't issue the same write twice.
#[derive(Debug, Clone, Default)]
pub struct MutationGuard {
    pending: Arc<Mutex<HashSet<MutationKey>>>,
}

/// A write in flight. Dropping it marks the write finished.
#[derive(Debug)]
pub struct Pending {
    pending: Arc<Mutex<HashSet<MutationKey>>>,
    key: MutationKey,
}

impl Drop for Pending {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.key);
    }
}

impl MutationGuard {
    /// Mark the write as in flight, or fail with `Conflict` if an identical one already is.
    pub fn begin(&self, key: MutationKey) -> Fallible<Pending> {
        if !lock(&self.pending).insert(key.clone()) {
            return Err(TfError::new(
                format!("{:?} is already pending", key),
                ExternalError::new(Cause::Conflict, "Still working on your last request"),
            ));
        }
        Ok(Pending {
            pending: Arc::clone(&self.pending),
            key,
        })
    }

    pub fn is_pending(&self, key: &MutationKey) -> bool {
        lock(&self.pending).contains(key)
    }
}

/// Every cache and pending-set the handlers share.
#[derive(Debug, Clone)]
pub struct QueryClient {
    pub feed: QueryCache<&'static str, Vec<Post>>,
    /// Keyed by the digest of the session secret.
    pub current_user: QueryCache<String, User>,
    pub mutations: MutationGuard,
}

impl QueryClient {
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.query_cache_capacity,
            Duration::from_secs(config.feed_stale_secs),
            Duration::from_secs(config.current_user_stale_secs),
        )
    }

    /// `capacity` bounds each cache; the feed cache only ever holds one key.
    pub fn new(
        capacity: usize,
        feed_stale_time: Duration,
        current_user_stale_time: Duration,
    ) -> Self {
        Self {
            feed: QueryCache::new(1, feed_stale_time),
            current_user: QueryCache::new(capacity, current_user_stale_time),
            mutations: MutationGuard::default(),
        }
    }

    /// Forget who this session belonged to, e.g. after signing out.
    pub fn forget_session(&self, secret: &SessionSecret) {
        self.current_user.invalidate(&secret.digest());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[actix_rt::test]
    async fn test_fresh_entries_skip_the_fetch() {
        let cache: QueryCache<&str, u32> = QueryCache::new(8, Duration::from_secs(60));
        let calls = Cell::new(0);
        for _ in 0..3 {
            let value = cache
                .fetch("k", || async {
                    calls.set(calls.get() + 1);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(calls.get(), 1);

        cache.invalidate(&"k");
        assert_eq!(cache.get_fresh(&"k"), None);
    }

    #[actix_rt::test]
    async fn test_stale_entries_are_refetched() {
        let cache: QueryCache<&str, u32> = QueryCache::new(8, Duration::from_secs(0));
        cache.insert("k", 1);
        assert_eq!(cache.get_fresh(&"k"), None);
        let value = cache.fetch("k", || async { Ok(2) }).await.unwrap();
        assert_eq!(value, 2);
    }

    #[actix_rt::test]
    async fn test_errors_are_not_cached() {
        let cache: QueryCache<&str, u32> = QueryCache::new(8, Duration::from_secs(60));
        let err = cache
            .fetch("k", || async {
                Err(TfError::new("boom", Cause::Network.into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.cause(), Cause::Network);
        assert_eq!(cache.get_fresh(&"k"), None);
    }

    #[test]
    fn test_stale_entries_are_dropped() {
        let cache: QueryCache<u32, u32> = QueryCache::new(10_000, Duration::from_secs(0));
        for key in 0..10_000 {
            cache.insert(key, key);
        }
        for key in 0..10_000 {
            assert_eq!(cache.get_fresh(&key), None);
        }
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_cache_is_bounded() {
        let cache: QueryCache<u32, u32> = QueryCache::new(2, Duration::from_secs(60));
        cache.insert(1, 1);
        cache.insert(2, 2);
        assert_eq!(cache.get_fresh(&1), Some(1));
        cache.insert(3, 3);
        assert_eq!(cache.len(), 2);
        // 2 was the least recently used.
        assert_eq!(cache.get_fresh(&2), None);
        assert_eq!(cache.get_fresh(&1), Some(1));
        assert_eq!(cache.get_fresh(&3), Some(3));
    }

    #[test]
    fn test_identical_mutation_is_rejected_while_pending() {
        let guard = MutationGuard::default();
        let key = MutationKey::new(MutationKind::Save, "u1", "p1");

        let pending = guard.begin(key.clone()).unwrap();
        let err = guard.begin(key.clone()).unwrap_err();
        assert_eq!(err.cause(), Cause::Conflict);

        // Other users and other targets aren't blocked.
        assert!(guard
            .begin(MutationKey::new(MutationKind::Save, "u2", "p1"))
            .is_ok());
        assert!(guard
            .begin(MutationKey::new(MutationKind::Like, "u1", "p1"))
            .is_ok());

        drop(pending);
        assert!(!guard.is_pending(&key));
        assert!(guard.begin(key).is_ok());
    }
}
