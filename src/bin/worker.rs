//! Worker process: drains the shared queue and probes URLs.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use linkpulse::config::Config;
use linkpulse::db::DbRouter;
use linkpulse::logging::{setup_logging, LogFormat};
use linkpulse::shutdown;
use linkpulse::store::SharedStore;
use linkpulse::worker::Worker;

#[derive(Parser)]
#[command(name = "worker", about = "URL check worker", version)]
struct Args {
    /// Worker identifier; defaults to worker-<pid>.
    id: Option<String>,
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

    let worker_id = args
        .id
        .unwrap_or_else(|| format!("worker-{}", std::process::id()));
    info!(
        worker_id = %worker_id,
        version = env!("CARGO_PKG_VERSION"),
        "starting worker"
    );

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
            info!("LEADER_DSN not set, check archiving disabled");
            None
        }
    };

    let worker = match Worker::new(worker_id, store, db, &config) {
        Ok(worker) => worker,
        Err(e) => {
            error!(error = %e, "worker setup failed");
            return ExitCode::FAILURE;
        }
    };

    let shutdown_rx = shutdown::listen();
    match worker.run(shutdown_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "worker exited with error");
            ExitCode::FAILURE
        }
    }
}
