//! Queue seeding.
//!
//! Reads a newline-delimited URL file, resets the fleet's per-run state, and
//! streams the URLs into the shared queue.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::store::{Counter, SharedStore};

/// URLs accumulated before each queue push.
const SEED_CHUNK: usize = 500;
/// Throughput log cadence, in enqueued URLs.
const PROGRESS_EVERY: u64 = 10_000;

/// Seed the queue from `path`. Clears the previous run's queue, results,
/// and counters first, and records the total under `total_urls`. Returns
/// the number of URLs enqueued.
pub async fn seed_from_file(store: &SharedStore, path: &Path) -> anyhow::Result<u64> {
    store.reset_run().await?;
    info!("cleared previous run data");

    let file = File::open(path)
        .await
        .with_context(|| format!("could not open {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let started = Instant::now();
    let mut chunk: Vec<String> = Vec::with_capacity(SEED_CHUNK);
    let mut count: u64 = 0;

    while let Some(line) = lines.next_line().await.context("could not read URL file")? {
        let url = line.trim();
        if url.is_empty() {
            continue;
        }
        chunk.push(url.to_owned());
        if chunk.len() == SEED_CHUNK {
            count += store.push_urls(&chunk).await?;
            chunk.clear();
            if count % PROGRESS_EVERY == 0 {
                let rate = count as f64 / started.elapsed().as_secs_f64().max(f64::EPSILON);
                info!(enqueued = count, rate_per_sec = format!("{rate:.0}"), "seeding");
            }
        }
    }
    if !chunk.is_empty() {
        count += store.push_urls(&chunk).await?;
    }

    store.set_counter(Counter::TotalUrls, count as i64).await?;

    let elapsed = started.elapsed();
    let rate = count as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        enqueued = count,
        elapsed_secs = format!("{:.2}", elapsed.as_secs_f64()),
        rate_per_sec = format!("{rate:.0}"),
        "seeding complete"
    );
    Ok(count)
}
