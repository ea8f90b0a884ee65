//! Distributed URL-checking pipeline.
//!
//! A fleet of identical worker processes drain URLs from a shared Redis
//! queue, probe them over HTTP, and record the outcomes. The interesting
//! machinery lives in three places: a two-tier cache with single-flight
//! coalescing ([`cache`], [`singleflight`]), a batched result flusher with a
//! bounded overflow path ([`flusher`]), and a primary/replica database
//! router with health-monitored fallback ([`db`]).

pub mod cache;
pub mod config;
pub mod db;
pub mod flusher;
pub mod latency;
pub mod logging;
pub mod models;
pub mod probe;
pub mod producer;
pub mod shutdown;
pub mod singleflight;
pub mod store;
pub mod web;
pub mod worker;
