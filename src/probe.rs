//! HTTP probing.

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::time::Instant;

use crate::models::UrlResult;

/// Issues one GET per URL and folds every outcome, including transport
/// failures, into a [`UrlResult`]. Probing never fails at the call boundary;
/// failure is data.
#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
    worker_id: String,
}

impl Prober {
    pub fn new(timeout: Duration, worker_id: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(100)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, worker_id })
    }

    /// Probe a single URL. Duration covers the exchange up to response
    /// headers; the body is not read.
    pub async fn probe(&self, url: &str) -> UrlResult {
        let checked_at = Utc::now();
        let started = Instant::now();
        let mut result = UrlResult {
            url: url.to_owned(),
            status: 0,
            error: String::new(),
            duration_ms: 0,
            checked_at,
            worker_id: self.worker_id.clone(),
        };

        match self.client.get(url).send().await {
            Ok(response) => {
                result.status = response.status().as_u16();
                result.duration_ms = started.elapsed().as_millis() as u64;
                if result.status != 200 {
                    result.error = format!("HTTP {}", result.status);
                }
            }
            Err(e) => {
                result.error = e.to_string();
                result.duration_ms = started.elapsed().as_millis() as u64;
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_url_becomes_transport_failure() {
        let prober = Prober::new(Duration::from_secs(1), "test-worker".to_owned()).unwrap();
        let result = prober.probe("notaurl").await;
        assert_eq!(result.status, 0);
        assert!(!result.error.is_empty());
        assert!(!result.is_success());
        assert_eq!(result.worker_id, "test-worker");
        assert_eq!(result.url, "notaurl");
    }

    #[tokio::test]
    async fn unsupported_scheme_becomes_transport_failure() {
        let prober = Prober::new(Duration::from_secs(1), "test-worker".to_owned()).unwrap();
        let result = prober.probe("ftp://example.com/file").await;
        assert_eq!(result.status, 0);
        assert!(!result.error.is_empty());
    }
}
