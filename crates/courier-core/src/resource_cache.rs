use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_util::{Clock, SystemClock};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Semaphore;

use crate::error::CoreError;

/// Loads one resource by key. `Ok(None)` means the resource does not exist;
/// `Err` means the lookup itself failed.
pub trait ResourceFetcher<K, V>: Send + Sync + 'static {
    fn fetch(&self, key: &K) -> impl Future<Output = Result<Option<V>, CoreError>> + Send;
}

impl<K, V, T: ResourceFetcher<K, V>> ResourceFetcher<K, V> for Arc<T> {
    fn fetch(&self, key: &K) -> impl Future<Output = Result<Option<V>, CoreError>> + Send {
        (**self).fetch(key)
    }
}

/// What the cache knows about a key without fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<V> {
    Present(V),
    /// Recently confirmed missing.
    Absent,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ResourceCacheConfig {
    /// Fetches allowed in flight at once, across all keys.
    pub max_concurrent: usize,
    /// How long a not-found answer is trusted.
    pub negative_ttl: Duration,
    pub max_entries: u64,
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            negative_ttl: Duration::from_secs(10 * 60),
            max_entries: 512,
        }
    }
}

type PendingFetch<V> = Shared<BoxFuture<'static, Result<Option<V>, CoreError>>>;

/// Results and in-flight fetches, shared with the fetch tasks.
struct CacheState<K, V> {
    /// Key -> (fetch id, shared result).
    pending: DashMap<K, (u64, PendingFetch<V>)>,
    found: moka::sync::Cache<K, V>,
    /// Key -> expiry in Unix millis. Expired entries are dropped on lookup.
    missing: DashMap<K, i64>,
    negative_ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl<K, V> CacheState<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn record(&self, key: &K, result: &Result<Option<V>, CoreError>) {
        match result {
            Ok(Some(value)) => {
                self.found.insert(key.clone(), value.clone());
            }
            Ok(None) => {
                let expires_at = self.clock.now_millis() + self.negative_ttl_ms;
                self.missing.insert(key.clone(), expires_at);
                tracing::debug!(?key, "resource not found, caching miss");
            }
            Err(e) => {
                tracing::debug!(?key, error = %e, "resource fetch failed");
            }
        }
    }
}

/// Deduplicating, concurrency-bounded fetch cache.
///
/// Concurrent `fetch` calls for one key share a single underlying request.
/// At most `max_concurrent` requests run at once; the rest queue in arrival
/// order. Found values go into a bounded cache, not-found answers are
/// remembered for `negative_ttl`, and failures are not remembered at all.
///
/// Each request runs on its own task, so it completes, is cached, and frees
/// its slot even when every caller waiting on it has gone away.
pub struct ResourceCache<K, V, F> {
    fetcher: Arc<F>,
    permits: Arc<Semaphore>,
    state: Arc<CacheState<K, V>>,
    next_fetch: AtomicU64,
}

impl<K, V, F> ResourceCache<K, V, F>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: ResourceFetcher<K, V>,
{
    pub fn new(fetcher: F, config: ResourceCacheConfig) -> Self {
        Self::with_clock(fetcher, config, Arc::new(SystemClock))
    }

    pub fn with_clock(fetcher: F, config: ResourceCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            state: Arc::new(CacheState {
                pending: DashMap::new(),
                found: moka::sync::Cache::new(config.max_entries),
                missing: DashMap::new(),
                negative_ttl_ms: config.negative_ttl.as_millis() as i64,
                clock,
            }),
            next_fetch: AtomicU64::new(0),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn get(&self, key: &K) -> CacheLookup<V> {
        let state = &self.state;
        if let Some(value) = state.found.get(key) {
            return CacheLookup::Present(value);
        }
        let Some(expires_at) = state.missing.get(key).map(|e| *e) else {
            return CacheLookup::Unknown;
        };
        let now = state.clock.now_millis();
        if now < expires_at {
            return CacheLookup::Absent;
        }
        state.missing.remove_if(key, |_, exp| *exp <= now);
        CacheLookup::Unknown
    }

    /// Resolve `key`, from the cache if possible, otherwise by joining or
    /// starting a fetch. Must be called inside a tokio runtime.
    pub async fn fetch(&self, key: &K) -> Result<Option<V>, CoreError> {
        match self.get(key) {
            CacheLookup::Present(value) => return Ok(Some(value)),
            CacheLookup::Absent => return Ok(None),
            CacheLookup::Unknown => {}
        }

        let shared = self
            .state
            .pending
            .entry(key.clone())
            .or_insert_with(|| self.start(key.clone()))
            .1
            .clone();
        shared.await
    }

    fn start(&self, key: K) -> (u64, PendingFetch<V>) {
        let id = self.next_fetch.fetch_add(1, Ordering::Relaxed);
        let fetcher = Arc::clone(&self.fetcher);
        let permits = Arc::clone(&self.permits);
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => fetcher.fetch(&key).await,
                Err(_) => Err(CoreError::State("resource cache is closed".into())),
            };
            state.record(&key, &result);
            // Only clear our own fetch; a newer one may already be registered.
            state.pending.remove_if(&key, |_, (pending, _)| *pending == id);
            result
        });

        let shared = async move {
            task.await.unwrap_or_else(|e| {
                Err(CoreError::State(format!("resource fetch task failed: {e}")))
            })
        }
        .boxed()
        .shared();
        (id, shared)
    }

    /// Forget everything known about `key`. An in-flight fetch still
    /// completes and is cached.
    pub fn invalidate(&self, key: &K) {
        self.state.found.invalidate(key);
        self.state.missing.remove(key);
    }

    pub fn clear(&self) {
        self.state.found.invalidate_all();
        self.state.missing.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending.len()
    }
}
