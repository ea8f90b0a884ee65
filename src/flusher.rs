//! Batched result flusher.
//!
//! Workers hand each probe result to [`ResultsFlusher::add`], which never
//! blocks for longer than one store round trip: results are buffered on a
//! bounded channel and bulk-appended by a background aggregator, and when
//! the channel is full the result is written through directly instead.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::models::UrlResult;

/// Destination for serialized results. One call appends all payloads in
/// order at the head of the shared list.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn append_results(&self, payloads: Vec<String>) -> anyhow::Result<()>;
}

/// Admission buffer between `add` callers and the aggregator.
const CHANNEL_CAPACITY: usize = 1000;
/// A batch is flushed as soon as it reaches this size.
const MAX_BATCH: usize = 500;
/// Partial batches are flushed on this cadence.
const FLUSH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlusherState {
    Running,
    Stopping,
    Stopped,
}

const STATE_RUNNING: u8 = 0;
const STATE_STOPPING: u8 = 1;
const STATE_STOPPED: u8 = 2;

pub struct ResultsFlusher {
    tx: Option<mpsc::Sender<UrlResult>>,
    sink: Arc<dyn ResultSink>,
    state: AtomicU8,
    aggregator: Option<JoinHandle<()>>,
}

impl ResultsFlusher {
    /// Spawn the background aggregator against `sink`.
    pub fn new(sink: Arc<dyn ResultSink>) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let aggregator = tokio::spawn(run_aggregator(rx, sink.clone()));
        Self {
            tx: Some(tx),
            sink,
            state: AtomicU8::new(STATE_RUNNING),
            aggregator: Some(aggregator),
        }
    }

    /// Accept a result for flushing. If the admission channel is full, the
    /// result is serialized and appended directly so producers never block
    /// behind the batcher; such results may land ahead of buffered ones.
    /// Only valid while Running; afterwards the result is dropped.
    pub async fn add(&self, result: UrlResult) {
        let Some(tx) = &self.tx else {
            warn!(url = %result.url, "flusher already stopped, dropping result");
            return;
        };
        match tx.try_send(result) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(result)) => {
                warn!(url = %result.url, "flusher channel full, writing result through directly");
                match serde_json::to_string(&result) {
                    Ok(payload) => {
                        if let Err(e) = self.sink.append_results(vec![payload]).await {
                            error!(error = %e, "direct result write failed, dropping result");
                        }
                    }
                    Err(e) => error!(error = %e, "failed to serialize result, dropping it"),
                }
            }
            Err(mpsc::error::TrySendError::Closed(result)) => {
                warn!(url = %result.url, "flusher already stopped, dropping result");
            }
        }
    }

    pub fn state(&self) -> FlusherState {
        match self.state.load(Ordering::Acquire) {
            STATE_RUNNING => FlusherState::Running,
            STATE_STOPPING => FlusherState::Stopping,
            _ => FlusherState::Stopped,
        }
    }

    /// Stop accepting results, drain everything already admitted, and flush
    /// the final batch. Returns once the aggregator has settled; calling it
    /// again is a no-op.
    pub async fn stop(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        self.state.store(STATE_STOPPING, Ordering::Release);
        // Closing the channel lets the aggregator drain to completion.
        drop(tx);
        if let Some(aggregator) = self.aggregator.take() {
            if let Err(e) = aggregator.await {
                error!(error = %e, "flusher aggregator task failed");
            }
        }
        self.state.store(STATE_STOPPED, Ordering::Release);
    }
}

async fn run_aggregator(mut rx: mpsc::Receiver<UrlResult>, sink: Arc<dyn ResultSink>) {
    let mut batch: Vec<UrlResult> = Vec::with_capacity(MAX_BATCH);
    // First tick lands a full interval out, matching a plain ticker.
    let mut tick = interval_at(Instant::now() + FLUSH_INTERVAL, FLUSH_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(result) => {
                    batch.push(result);
                    if batch.len() >= MAX_BATCH {
                        flush(&sink, &mut batch).await;
                    }
                }
                // Channel closed and drained: final flush, then settle.
                None => {
                    flush(&sink, &mut batch).await;
                    return;
                }
            },
            _ = tick.tick() => flush(&sink, &mut batch).await,
        }
    }
}

/// Serialize the batch and append it in one multi-value call. A failed
/// append discards the batch; results are best-effort and consumers
/// tolerate gaps and duplicates.
async fn flush(sink: &Arc<dyn ResultSink>, batch: &mut Vec<UrlResult>) {
    if batch.is_empty() {
        return;
    }
    let payloads: Vec<String> = batch
        .drain(..)
        .filter_map(|result| serde_json::to_string(&result).ok())
        .collect();
    let count = payloads.len();
    match sink.append_results(payloads).await {
        Ok(()) => debug!(count, "flushed results"),
        Err(e) => error!(count, error = %e, "result flush failed, discarding batch"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Sink recording every append call.
    #[derive(Default)]
    struct RecordingSink {
        appends: Mutex<Vec<Vec<String>>>,
    }

    impl RecordingSink {
        fn batches(&self) -> Vec<Vec<String>> {
            self.appends.lock().unwrap().clone()
        }

        fn total(&self) -> usize {
            self.appends.lock().unwrap().iter().map(Vec::len).sum()
        }
    }

    #[async_trait]
    impl ResultSink for RecordingSink {
        async fn append_results(&self, payloads: Vec<String>) -> anyhow::Result<()> {
            self.appends.lock().unwrap().push(payloads);
            Ok(())
        }
    }

    fn numbered_result(n: usize) -> UrlResult {
        UrlResult {
            url: format!("https://example.com/{n}"),
            status: 200,
            error: String::new(),
            duration_ms: n as u64,
            checked_at: Utc::now(),
            worker_id: "test-worker".to_owned(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_batch_flushes_immediately() {
        let sink = Arc::new(RecordingSink::default());
        let mut flusher = ResultsFlusher::new(sink.clone());

        for n in 0..MAX_BATCH {
            flusher.add(numbered_result(n)).await;
            // Let the aggregator keep pace so the channel never fills.
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), MAX_BATCH);
        flusher.stop().await;
        assert_eq!(flusher.state(), FlusherState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_batch_flushes_on_tick() {
        let sink = Arc::new(RecordingSink::default());
        let mut flusher = ResultsFlusher::new(sink.clone());

        for n in 0..3 {
            flusher.add(numbered_result(n)).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(sink.total(), 0);

        tokio::time::sleep(FLUSH_INTERVAL + Duration::from_millis(100)).await;
        assert_eq!(sink.total(), 3);
        flusher.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_drains_pending_results_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let mut flusher = ResultsFlusher::new(sink.clone());
        assert_eq!(flusher.state(), FlusherState::Running);

        for n in 0..42 {
            flusher.add(numbered_result(n)).await;
        }
        flusher.stop().await;

        assert_eq!(sink.total(), 42);
        let flattened: Vec<String> = sink.batches().into_iter().flatten().collect();
        for (n, payload) in flattened.iter().enumerate() {
            let parsed: UrlResult = serde_json::from_str(payload).unwrap();
            assert_eq!(parsed.duration_ms, n as u64);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_takes_direct_write_path() {
        let sink = Arc::new(RecordingSink::default());
        let mut flusher = ResultsFlusher::new(sink.clone());

        // Without yielding, the aggregator never runs, so the channel fills
        // to capacity and the next add must write through.
        for n in 0..CHANNEL_CAPACITY {
            flusher.add(numbered_result(n)).await;
        }
        assert_eq!(sink.total(), 0);

        flusher.add(numbered_result(CHANNEL_CAPACITY)).await;
        assert_eq!(sink.total(), 1, "overflow result bypasses the batcher");

        flusher.stop().await;
        assert_eq!(sink.total(), CHANNEL_CAPACITY + 1);
        // Batches never exceed the configured size.
        assert!(sink.batches().iter().all(|b| b.len() <= MAX_BATCH));
    }

    #[tokio::test(start_paused = true)]
    async fn add_after_stop_is_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let mut flusher = ResultsFlusher::new(sink.clone());
        flusher.stop().await;
        assert_eq!(flusher.state(), FlusherState::Stopped);

        flusher.add(numbered_result(0)).await;
        assert_eq!(sink.total(), 0);

        // A second stop is a no-op.
        flusher.stop().await;
        assert_eq!(flusher.state(), FlusherState::Stopped);
    }
}
