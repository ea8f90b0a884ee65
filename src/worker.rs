//! The worker loop.
//!
//! Each worker process runs a single consumer: pop a URL from the shared
//! queue, resolve it through the tiered cache (which probes the origin on a
//! miss), hand the result to the flusher, and keep the fleet counters
//! current. Infrastructure failures are logged and retried; probe failures
//! are data and never unwind the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::TieredCache;
use crate::config::Config;
use crate::db::{checks, DbRouter};
use crate::flusher::ResultsFlusher;
use crate::latency::LatencyTracker;
use crate::probe::Prober;
use crate::store::{Counter, SharedStore};

/// In-process cache slots for known-good URLs.
const L1_CACHE_CAPACITY: usize = 1000;
/// Progress log cadence, in processed URLs.
const PROGRESS_EVERY: u64 = 100;
/// Cache/latency summary cadence, in processed URLs.
const SUMMARY_EVERY: u64 = 500;

pub struct Worker {
    id: String,
    store: SharedStore,
    cache: TieredCache<SharedStore>,
    flusher: ResultsFlusher,
    prober: Prober,
    /// Check archive; results are only archived when a primary database is
    /// configured.
    db: Option<Arc<DbRouter>>,
    latency: LatencyTracker,
    pop_timeout: Duration,
    max_retries: u32,
    processed: u64,
}

impl Worker {
    pub fn new(
        id: String,
        store: SharedStore,
        db: Option<Arc<DbRouter>>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let cache = TieredCache::new(L1_CACHE_CAPACITY, store.clone())?;
        let flusher = ResultsFlusher::new(Arc::new(store.clone()));
        let prober = Prober::new(Duration::from_secs(config.http_timeout), id.clone())?;
        Ok(Self {
            id,
            store,
            cache,
            flusher,
            prober,
            db,
            latency: LatencyTracker::new(),
            pop_timeout: Duration::from_secs(config.worker_timeout),
            max_retries: config.max_retries,
            processed: 0,
        })
    }

    /// Run until shutdown is signaled or the queue stays unreachable past
    /// the retry ceiling. On shutdown, stops popping, drains the flusher,
    /// and logs final summaries.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        info!(worker_id = %self.id, "worker started");
        let mut retry_count: u32 = 0;

        loop {
            let popped = tokio::select! {
                _ = shutdown_rx.recv() => break,
                popped = self.store.pop_url(self.pop_timeout) => popped,
            };

            let url = match popped {
                Ok(Some(url)) => {
                    retry_count = 0;
                    url
                }
                // Queue stayed empty for the whole window.
                Ok(None) => continue,
                Err(e) => {
                    retry_count += 1;
                    if retry_count >= self.max_retries {
                        error!(
                            worker_id = %self.id,
                            error = %e,
                            attempts = retry_count,
                            "queue unreachable, giving up"
                        );
                        anyhow::bail!("queue unreachable after {retry_count} attempts");
                    }
                    let backoff = Duration::from_secs(u64::from(retry_count));
                    warn!(
                        worker_id = %self.id,
                        error = %e,
                        retry = retry_count,
                        backoff_secs = backoff.as_secs(),
                        "queue read failed, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            self.check_one(url).await;
        }

        info!(
            worker_id = %self.id,
            processed = self.processed,
            "shutting down, draining flusher"
        );
        self.flusher.stop().await;
        log_cache_stats(&self.id, &self.cache);
        self.latency.log_summary();
        info!(worker_id = %self.id, "worker stopped");
        Ok(())
    }

    async fn check_one(&mut self, url: String) {
        if let Err(e) = self.store.incr(Counter::Processing).await {
            debug!(error = %e, "failed to bump processing counter");
        }

        let started = Instant::now();
        let prober = &self.prober;
        let (result, served) = self
            .cache
            .get(&url, |target| async move { prober.probe(&target).await })
            .await;
        self.latency.record(started.elapsed());

        let succeeded = result.is_success();
        if let Some(db) = &self.db {
            // Non-fatal: the archive is best-effort.
            if let Err(e) = checks::record_check(db, &result).await {
                debug!(error = %e, url = %result.url, "failed to archive check");
            }
        }
        self.flusher.add(result).await;

        let outcome = if succeeded {
            Counter::Success
        } else {
            Counter::Error
        };
        if let Err(e) = self.store.incr(outcome).await {
            debug!(error = %e, "failed to bump outcome counter");
        }
        let cache_counter = if served.is_cache_hit() {
            Counter::CacheHit
        } else {
            Counter::CacheMiss
        };
        if let Err(e) = self.store.incr(cache_counter).await {
            debug!(error = %e, "failed to bump cache counter");
        }
        if let Err(e) = self.store.decr(Counter::Processing).await {
            debug!(error = %e, "failed to drop processing counter");
        }

        self.processed += 1;
        if self.processed % PROGRESS_EVERY == 0 {
            info!(worker_id = %self.id, processed = self.processed, "progress");
        }
        if self.processed % SUMMARY_EVERY == 0 {
            log_cache_stats(&self.id, &self.cache);
            self.latency.log_summary();
        }
    }
}

fn log_cache_stats(worker_id: &str, cache: &TieredCache<SharedStore>) {
    let stats = cache.stats();
    let total = stats.l1_hits + stats.l2_hits + stats.origin_fetches;
    if total == 0 {
        return;
    }
    let efficiency = (stats.l1_hits + stats.l2_hits) as f64 / total as f64 * 100.0;
    info!(
        worker_id = %worker_id,
        l1_hits = stats.l1_hits,
        l2_hits = stats.l2_hits,
        origin_fetches = stats.origin_fetches,
        cache_efficiency_pct = format!("{efficiency:.1}"),
        "cache stats"
    );
}
