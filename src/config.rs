//! Environment configuration.
//!
//! Every process reads the same variable set; unset variables fall back to
//! the documented defaults. Values are loaded through figment's raw
//! environment provider so `REDIS_ADDR` maps onto `redis_addr` and so on.

use anyhow::Context;
use figment::providers::Env;
use figment::Figment;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Redis host:port (or a full redis:// URL) for the shared store.
    #[serde(default = "default_redis_addr")]
    pub redis_addr: String,
    /// Queue block-pop timeout in seconds.
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout: u64,
    /// HTTP probe timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,
    /// Consecutive queue-read failures tolerated before the worker exits.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Soft cap on the results list, enforced by the API's periodic trim.
    #[serde(default = "default_results_to_keep")]
    pub results_to_keep: i64,
    /// Primary (write) database DSN. Optional; analytics are disabled
    /// without it.
    #[serde(default)]
    pub leader_dsn: Option<String>,
    /// Replica (read) database DSN. Optional; the router runs primary-only
    /// without it.
    #[serde(default)]
    pub follower_dsn: Option<String>,
    /// API bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base log level when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_redis_addr() -> String {
    "localhost:6379".to_owned()
}

fn default_worker_timeout() -> u64 {
    1
}

fn default_http_timeout() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    5
}

fn default_results_to_keep() -> i64 {
    10_000
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> anyhow::Result<Self> {
        Figment::new()
            .merge(Env::raw())
            .extract()
            .context("failed to load config from environment")
    }

    /// The Redis URL for the shared store, accepting either a bare
    /// `host:port` or a full `redis://` URL in `REDIS_ADDR`.
    pub fn redis_url(&self) -> String {
        if self.redis_addr.starts_with("redis://") || self.redis_addr.starts_with("rediss://") {
            self.redis_addr.clone()
        } else {
            format!("redis://{}", self.redis_addr)
        }
    }
}
