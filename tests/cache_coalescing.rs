//! End-to-end behavior of the tiered cache through its public API: a cold
//! popular URL costs one probe no matter how many tasks race on it, and the
//! tiers keep their promotion rules under concurrency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use linkpulse::cache::{Layer2, ServedBy, TieredCache};
use linkpulse::models::UrlResult;

/// Shared in-memory stand-in for the L2 store, cloneable so the test keeps
/// a handle to the entries the cache writes.
#[derive(Clone, Default)]
struct MemoryL2 {
    entries: Arc<Mutex<HashMap<String, UrlResult>>>,
}

#[async_trait]
impl Layer2 for MemoryL2 {
    async fn read(&self, url: &str) -> anyhow::Result<Option<UrlResult>> {
        Ok(self.entries.lock().unwrap().get(url).cloned())
    }

    async fn write(&self, url: &str, result: &UrlResult) -> anyhow::Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(url.to_owned(), result.clone());
        Ok(())
    }
}

fn ok_result(url: &str) -> UrlResult {
    UrlResult {
        url: url.to_owned(),
        status: 200,
        error: String::new(),
        duration_ms: 200,
        checked_at: Utc::now(),
        worker_id: "itest-worker".to_owned(),
    }
}

#[tokio::test(start_paused = true)]
async fn stampede_on_cold_url_costs_one_probe() {
    let l2 = MemoryL2::default();
    let cache = Arc::new(TieredCache::new(16, l2.clone()).unwrap());
    let probes = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..64 {
        let cache = cache.clone();
        let probes = probes.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get("https://popular.example/", move |url| async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    probes.fetch_add(1, Ordering::SeqCst);
                    ok_result(&url)
                })
                .await
        }));
    }

    let outcomes = futures::future::join_all(handles).await;
    let reference = outcomes[0].as_ref().unwrap().0.clone();
    for outcome in outcomes {
        let (result, _) = outcome.unwrap();
        assert_eq!(result, reference);
    }

    assert_eq!(probes.load(Ordering::SeqCst), 1);
    let stats = cache.stats();
    assert_eq!(stats.origin_fetches, 1);

    // The flight promoted the result, so the next read is an L1 hit and the
    // shared tier holds a copy for other processes.
    let (_, served) = cache
        .get("https://popular.example/", |_| async {
            panic!("probe must not run")
        })
        .await;
    assert_eq!(served, ServedBy::L1);
    assert!(l2
        .entries
        .lock()
        .unwrap()
        .contains_key("https://popular.example/"));
}

#[tokio::test(start_paused = true)]
async fn flights_for_different_urls_do_not_coalesce() {
    let cache = Arc::new(TieredCache::new(16, MemoryL2::default()).unwrap());
    let probes = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for n in 0..8 {
        let cache = cache.clone();
        let probes = probes.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get(&format!("https://site-{n}.example/"), move |url| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    probes.fetch_add(1, Ordering::SeqCst);
                    ok_result(&url)
                })
                .await
        }));
    }
    futures::future::join_all(handles).await;

    assert_eq!(probes.load(Ordering::SeqCst), 8);
    assert_eq!(cache.stats().origin_fetches, 8);
}
