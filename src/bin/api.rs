//! API process: exposes stats, results, health, and analytics over HTTP,
//! and runs the centralized results-list trimmer.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, warn};

use linkpulse::config::Config;
use linkpulse::db::DbRouter;
use linkpulse::logging::{setup_logging, LogFormat};
use linkpulse::shutdown;
use linkpulse::store::SharedStore;
use linkpulse::web::{self, ApiState};

/// Cadence of the results-list trim.
const TRIM_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "api", about = "URL check stats API", version)]
struct Args {
    /// Log output format.
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.log_format);

    let store = match SharedStore::connect(&config.redis_url()).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "could not reach the shared store");
            return ExitCode::FAILURE;
        }
    };

    let db = match &config.leader_dsn {
        Some(dsn) => match DbRouter::connect(dsn, config.follower_dsn.as_deref()).await {
            Ok(router) => Some(router),
            Err(e) => {
                error!(error = %e, "database router setup failed");
                return ExitCode::FAILURE;
            }
        },
        None => {
            info!("LEADER_DSN not set, analytics endpoints disabled");
            None
        }
    };

    let shutdown_rx = shutdown::listen();
    spawn_results_trimmer(
        store.clone(),
        config.results_to_keep,
        shutdown_rx.resubscribe(),
    );

    let state = ApiState { store, db };
    match web::serve(state, config.port, shutdown_rx).await {
        Ok(()) => {
            info!("API server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "API server failed");
            ExitCode::FAILURE
        }
    }
}

/// Keep the shared results list near its soft cap. One trimmer for the
/// whole fleet; workers append without ever trimming.
fn spawn_results_trimmer(
    store: SharedStore,
    keep: i64,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(TRIM_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tick.tick() => {
                    match store.trim_results(keep).await {
                        Ok(()) => debug!(keep, "trimmed results list"),
                        Err(e) => warn!(error = %e, "results trim failed"),
                    }
                }
            }
        }
    });
}
