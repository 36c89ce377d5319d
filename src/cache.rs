use crate::error::Result;
use crate::schema::MetricName;
use crate::store::MetricsStore;
use chrono::Utc;
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_METRICS_TTL: Duration = Duration::from_secs(300);

/// Milliseconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Debug, Clone)]
pub struct MetricSetCacheEntry {
    pub firm_id: String,
    pub metrics: Arc<Vec<MetricName>>,
    pub fetched_at_millis: i64,
}

impl MetricSetCacheEntry {
    pub fn is_fresh(&self, now_millis: i64, ttl_millis: i64) -> bool {
        now_millis - self.fetched_at_millis < ttl_millis
    }
}

/// Per-firm metric listings with a time-to-live.
///
/// Entries are only ever replaced whole. Two callers missing on the same firm at the same
/// time each query the store and the later write wins.
pub struct MetricsCache {
    store: Arc<dyn MetricsStore>,
    entries: DashMap<String, MetricSetCacheEntry>,
    ttl_millis: i64,
    clock: Clock,
}

impl MetricsCache {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self::with_ttl(store, DEFAULT_METRICS_TTL)
    }

    pub fn with_ttl(store: Arc<dyn MetricsStore>, ttl: Duration) -> Self {
        Self {
            store,
            entries: DashMap::new(),
            ttl_millis: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            clock: Arc::new(|| Utc::now().timestamp_millis()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_millis.max(0) as u64)
    }

    pub async fn get_metrics(&self, firm_id: &str) -> Result<Arc<Vec<MetricName>>> {
        let now = (self.clock)();

        let cached = self
            .entries
            .get(firm_id)
            .filter(|entry| entry.is_fresh(now, self.ttl_millis))
            .map(|entry| entry.metrics.clone());
        if let Some(metrics) = cached {
            debug!("Metrics cache hit for firm {}", firm_id);
            return Ok(metrics);
        }

        debug!("Metrics cache miss for firm {}, querying store", firm_id);
        let metrics = Arc::new(self.store.list_metrics(firm_id).await?);

        self.entries.insert(
            firm_id.to_string(),
            MetricSetCacheEntry {
                firm_id: firm_id.to_string(),
                metrics: metrics.clone(),
                fetched_at_millis: now,
            },
        );

        Ok(metrics)
    }

    pub fn entry(&self, firm_id: &str) -> Option<MetricSetCacheEntry> {
        self.entries.get(firm_id).map(|entry| entry.clone())
    }

    pub fn invalidate(&self, firm_id: &str) {
        self.entries.remove(firm_id);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnnotatorError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    struct CountingStore {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MetricsStore for CountingStore {
        async fn list_metrics(&self, firm_id: &str) -> Result<Vec<MetricName>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(AnnotatorError::MetricsLookup {
                    firm_id: firm_id.to_string(),
                    reason: "store offline".to_string(),
                });
            }
            Ok(vec![format!("Metric {}", call)])
        }
    }

    fn manual_clock(start: i64) -> (Arc<AtomicI64>, Clock) {
        let now = Arc::new(AtomicI64::new(start));
        let handle = now.clone();
        let clock: Clock = Arc::new(move || handle.load(Ordering::SeqCst));
        (now, clock)
    }

    #[tokio::test]
    async fn test_hits_within_ttl_query_once() {
        let store = Arc::new(CountingStore::new());
        let cache = MetricsCache::new(store.clone());

        let first = cache.get_metrics("852218").await.unwrap();
        let second = cache.get_metrics("852218").await.unwrap();
        let third = cache.get_metrics("852218").await.unwrap();

        assert_eq!(store.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[tokio::test]
    async fn test_stale_entry_is_refetched_whole() {
        let store = Arc::new(CountingStore::new());
        let (now, clock) = manual_clock(1_000_000);
        let cache = MetricsCache::new(store.clone()).with_clock(clock);

        let first = cache.get_metrics("852218").await.unwrap();
        assert_eq!(first.as_slice(), ["Metric 1".to_string()]);

        now.fetch_add(299_999, Ordering::SeqCst);
        cache.get_metrics("852218").await.unwrap();
        assert_eq!(store.calls(), 1);

        now.fetch_add(1, Ordering::SeqCst);
        let refreshed = cache.get_metrics("852218").await.unwrap();
        assert_eq!(store.calls(), 2);
        assert_eq!(refreshed.as_slice(), ["Metric 2".to_string()]);
        assert_eq!(
            cache.entry("852218").unwrap().fetched_at_millis,
            1_300_000
        );
    }

    #[tokio::test]
    async fn test_firms_are_cached_independently() {
        let store = Arc::new(CountingStore::new());
        let cache = MetricsCache::new(store.clone());

        cache.get_metrics("1").await.unwrap();
        cache.get_metrics("2").await.unwrap();
        cache.get_metrics("1").await.unwrap();

        assert_eq!(store.calls(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let store = Arc::new(CountingStore::new());
        let cache = MetricsCache::new(store.clone());

        cache.get_metrics("1").await.unwrap();
        cache.invalidate("1");
        cache.get_metrics("1").await.unwrap();

        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_not_cached() {
        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let cache = MetricsCache::new(store.clone());

        assert!(cache.get_metrics("1").await.is_err());
        assert!(cache.get_metrics("1").await.is_err());
        assert_eq!(store.calls(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_configured_ttl_governs_freshness() {
        let store = Arc::new(CountingStore::new());
        assert_eq!(MetricsCache::new(store.clone()).ttl(), DEFAULT_METRICS_TTL);

        let (now, clock) = manual_clock(0);
        let cache = MetricsCache::with_ttl(store.clone(), Duration::from_secs(60)).with_clock(clock);
        assert_eq!(cache.ttl(), Duration::from_secs(60));

        cache.get_metrics("1").await.unwrap();
        now.store(59_999, Ordering::SeqCst);
        cache.get_metrics("1").await.unwrap();
        assert_eq!(store.calls(), 1);

        now.store(60_000, Ordering::SeqCst);
        cache.get_metrics("1").await.unwrap();
        assert_eq!(store.calls(), 2);
    }
}
