//! Two-tier result cache.
//!
//! L1 is a small in-process LRU reserved for known-good (HTTP 200) results;
//! L2 is the shared store, which holds any outcome under a five-minute TTL
//! so repeated failures don't hammer the origin. Misses go to the origin
//! through the single-flight coalescer, so a popular URL costs one probe no
//! matter how many callers race on it.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::time::Instant;
use tracing::warn;

use crate::models::UrlResult;
use crate::singleflight::SingleFlight;

/// L1 entries are served for this long after insertion, then dropped on the
/// next read. There is no background sweeper.
const L1_FRESH_FOR: Duration = Duration::from_secs(60);

/// The shared cache tier. Implementations absorb their own serialization
/// concerns; a corrupt stored entry reads as `None`.
#[async_trait]
pub trait Layer2: Send + Sync {
    async fn read(&self, url: &str) -> anyhow::Result<Option<UrlResult>>;
    async fn write(&self, url: &str, result: &UrlResult) -> anyhow::Result<()>;
}

/// Which tier served a [`TieredCache::get`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedBy {
    L1,
    L2,
    Origin,
}

impl ServedBy {
    pub fn is_cache_hit(self) -> bool {
        !matches!(self, ServedBy::Origin)
    }
}

/// Per-tier hit counters. Loads are independent; the snapshot is advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub origin_fetches: u64,
}

struct L1Entry {
    result: UrlResult,
    inserted_at: Instant,
}

pub struct TieredCache<L2> {
    l1: Mutex<LruCache<String, L1Entry>>,
    l2: L2,
    flight: SingleFlight<String, UrlResult>,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    origin_fetches: AtomicU64,
}

impl<L2: Layer2> TieredCache<L2> {
    pub fn new(l1_capacity: usize, l2: L2) -> anyhow::Result<Self> {
        let capacity = NonZeroUsize::new(l1_capacity)
            .ok_or_else(|| anyhow::anyhow!("L1 cache capacity must be non-zero"))?;
        Ok(Self {
            l1: Mutex::new(LruCache::new(capacity)),
            l2,
            flight: SingleFlight::new(),
            l1_hits: AtomicU64::new(0),
            l2_hits: AtomicU64::new(0),
            origin_fetches: AtomicU64::new(0),
        })
    }

    /// Look up `url`, falling through L1 → L2 → origin. The probe runs at
    /// most once across all concurrent callers for the same URL; only that
    /// flight updates the tiers and the origin counter.
    pub async fn get<F, Fut>(&self, url: &str, probe: F) -> (UrlResult, ServedBy)
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = UrlResult>,
    {
        if let Some(result) = self.l1_lookup(url) {
            self.l1_hits.fetch_add(1, Ordering::Relaxed);
            return (result, ServedBy::L1);
        }

        match self.l2.read(url).await {
            Ok(Some(result)) => {
                self.l2_hits.fetch_add(1, Ordering::Relaxed);
                if result.status == 200 {
                    self.l1_insert(url, result.clone());
                }
                return (result, ServedBy::L2);
            }
            Ok(None) => {}
            Err(e) => warn!(url, error = %e, "L2 read failed, falling through to origin"),
        }

        let result = self
            .flight
            .run(url.to_owned(), || async move {
                let result = probe(url.to_owned()).await;
                self.origin_fetches.fetch_add(1, Ordering::Relaxed);
                if result.status == 200 {
                    self.l1_insert(url, result.clone());
                }
                if let Err(e) = self.l2.write(url, &result).await {
                    warn!(url, error = %e, "L2 write failed");
                }
                result
            })
            .await;
        (result, ServedBy::Origin)
    }

    /// Fresh L1 hit, or remove a stale entry and report a miss.
    fn l1_lookup(&self, url: &str) -> Option<UrlResult> {
        let mut l1 = self.l1.lock().unwrap();
        match l1.get(url) {
            Some(entry) if entry.inserted_at.elapsed() < L1_FRESH_FOR => {
                Some(entry.result.clone())
            }
            Some(_) => {
                l1.pop(url);
                None
            }
            None => None,
        }
    }

    fn l1_insert(&self, url: &str, result: UrlResult) {
        self.l1.lock().unwrap().put(
            url.to_owned(),
            L1Entry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            origin_fetches: self.origin_fetches.load(Ordering::Relaxed),
        }
    }
}
