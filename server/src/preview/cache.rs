//! Link Preview Cache
//!
//! Two layers keyed by URL:
//! - a TTL cache of finished previews, swept periodically;
//! - an in-flight table that coalesces concurrent misses onto one computation.
//!
//! The computation runs in its own spawned task, so it is not tied to any
//! caller: a caller giving up on its own deadline does not cancel it, and a
//! panic inside it becomes [`PreviewError::Panicked`] for every waiter.
//! On success the value is published to the cache before the in-flight entry
//! is removed, so late arrivals always find one or the other.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error};

use super::{LinkPreview, PreviewError};

type PreviewResult = Result<Arc<LinkPreview>, PreviewError>;
type InFlight = Shared<BoxFuture<'static, PreviewResult>>;

struct CachedPreview {
    value: Arc<LinkPreview>,
    expires_at: Instant,
}

struct Inner {
    entries: DashMap<String, CachedPreview>,
    in_flight: DashMap<String, InFlight>,
    ttl: Duration,
    sweep_interval: Duration,
}

/// Shared, cloneable handle to the preview cache.
#[derive(Clone)]
pub struct PreviewCache {
    inner: Arc<Inner>,
}

impl PreviewCache {
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                ttl,
                sweep_interval,
            }),
        }
    }

    /// Cached preview for `key`, if present and not expired.
    pub fn get(&self, key: &str) -> Option<Arc<LinkPreview>> {
        if let Some(entry) = self.inner.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Some(Arc::clone(&entry.value));
            }
        }
        self.inner
            .entries
            .remove_if(key, |_, e| e.expires_at <= Instant::now());
        None
    }

    /// Return the cached preview for `key`, or compute it exactly once across
    /// all concurrent callers.
    ///
    /// `compute` is only invoked by the caller that starts the computation;
    /// otherwise it is dropped before waiting. Errors are shared with every
    /// waiter but not cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, compute: F) -> PreviewResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<LinkPreview, PreviewError>> + Send + 'static,
    {
        if let Some(hit) = self.get(key) {
            debug!(url = %key, "Link preview served from cache");
            return Ok(hit);
        }

        let fetch = match self.inner.in_flight.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                drop(compute);
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                // The previous computation may have published and left between
                // our cache miss and taking this entry.
                if let Some(hit) = self.get(key) {
                    return Ok(hit);
                }
                let fetch = self.start(key.to_string(), compute());
                slot.insert(fetch.clone());
                fetch
            }
        };

        fetch.await
    }

    fn start<Fut>(&self, key: String, work: Fut) -> InFlight
    where
        Fut: Future<Output = Result<LinkPreview, PreviewError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);

        let task = tokio::spawn(async move {
            let outcome = match tokio::spawn(work).await {
                Ok(result) => result.map(Arc::new),
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic());
                    error!(url = %key, panic_info = %message, "Panic recovered while fetching link preview");
                    Err(PreviewError::Panicked(message))
                }
                Err(e) => Err(PreviewError::Internal(e.to_string())),
            };

            if let Ok(value) = &outcome {
                inner.entries.insert(
                    key.clone(),
                    CachedPreview {
                        value: Arc::clone(value),
                        expires_at: Instant::now() + inner.ttl,
                    },
                );
            }
            inner.in_flight.remove(&key);

            outcome
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(PreviewError::Internal(e.to_string())))
        }
        .boxed()
        .shared()
    }

    /// Remove expired entries. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.inner.entries.len())
    }

    /// Spawn the background task that sweeps expired entries.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let cache = self.clone();
        let every = self.inner.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, "Swept expired link previews");
                }
            }
        })
    }

    /// Number of cached entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Number of computations currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn preview(title: &str) -> LinkPreview {
        LinkPreview {
            title: title.to_string(),
            ..LinkPreview::default()
        }
    }

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl Future<Output = Result<LinkPreview, PreviewError>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(preview("computed"))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = PreviewCache::new(Duration::from_secs(60), Duration::from_secs(600));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("https://example.com", || {
                        counting_fetch(&calls, Duration::from_millis(100))
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl_and_refetch_after() {
        let cache = PreviewCache::new(Duration::from_millis(100), Duration::from_secs(600));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            cache
                .get_or_fetch("k", || counting_fetch(&calls, Duration::ZERO))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get("k").is_none());

        cache
            .get_or_fetch("k", || counting_fetch(&calls, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_errors_are_shared_but_not_cached() {
        let cache = PreviewCache::new(Duration::from_secs(60), Duration::from_secs(600));
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err::<LinkPreview, _>(PreviewError::Timeout)
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch("k", || failing(Arc::clone(&calls))),
            cache.get_or_fetch("k", || failing(Arc::clone(&calls))),
        );
        assert_eq!(a.unwrap_err(), PreviewError::Timeout);
        assert_eq!(b.unwrap_err(), PreviewError::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());

        let again = cache.get_or_fetch("k", || failing(Arc::clone(&calls))).await;
        assert!(again.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panic_becomes_shared_error() {
        async fn explode() -> Result<LinkPreview, PreviewError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            panic!("malformed page");
        }

        let cache = PreviewCache::new(Duration::from_secs(60), Duration::from_secs(600));

        let (a, b) = tokio::join!(
            cache.get_or_fetch("bad", explode),
            cache.get_or_fetch("bad", explode),
        );
        assert_eq!(
            a.unwrap_err(),
            PreviewError::Panicked("malformed page".to_string())
        );
        assert!(matches!(b, Err(PreviewError::Panicked(_))));
        assert_eq!(cache.in_flight(), 0);

        // The cache keeps working afterwards
        let ok = cache
            .get_or_fetch("bad", || async { Ok(preview("recovered")) })
            .await
            .unwrap();
        assert_eq!(ok.title, "recovered");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_caller_does_not_cancel_computation() {
        let cache = PreviewCache::new(Duration::from_secs(60), Duration::from_secs(600));
        let calls = Arc::new(AtomicUsize::new(0));

        let short = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get_or_fetch("slow", || counting_fetch(&calls, Duration::from_millis(80))),
        )
        .await;
        assert!(short.is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let hit = cache.get("slow").expect("computation finished in background");
        assert_eq!(hit.title, "computed");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sweep_drops_expired_entries() {
        let cache = PreviewCache::new(Duration::from_millis(20), Duration::from_secs(600));
        cache
            .get_or_fetch("a", || async { Ok(preview("a")) })
            .await
            .unwrap();
        cache
            .get_or_fetch("b", || async { Ok(preview("b")) })
            .await
            .unwrap();
        assert_eq!(cache.sweep(), 0);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.sweep(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_task_runs_periodically() {
        let cache = PreviewCache::new(Duration::from_millis(10), Duration::from_millis(30));
        cache
            .get_or_fetch("a", || async { Ok(preview("a")) })
            .await
            .unwrap();

        let sweeper = cache.spawn_sweeper();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.is_empty());
        sweeper.abort();
    }
}
