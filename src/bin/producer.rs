//! Producer process: seeds the shared queue from a URL file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use linkpulse::config::Config;
use linkpulse::logging::{setup_logging, LogFormat};
use linkpulse::producer::seed_from_file;
use linkpulse::store::SharedStore;

#[derive(Parser)]
#[command(name = "producer", about = "Seed the URL check queue", version)]
struct Args {
    /// Newline-delimited file of URLs to enqueue.
    file: PathBuf,
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
    info!("connected to the shared store");

    match seed_from_file(&store, &args.file).await {
        Ok(count) => {
            info!(enqueued = count, "ready to start workers");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "seeding failed");
            ExitCode::FAILURE
        }
    }
}
