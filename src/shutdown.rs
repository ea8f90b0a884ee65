//! Process shutdown signaling.

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Listen for SIGINT/SIGTERM and broadcast a shutdown notification on the
/// first one. A second signal while draining is a hard exit: operators get
/// an escape hatch if the drain hangs.
pub fn listen() -> broadcast::Receiver<()> {
    let (tx, rx) = broadcast::channel(1);
    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        info!("shutdown signal received, draining");
        let _ = tx.send(());

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        warn!("second shutdown signal, exiting immediately");
        std::process::exit(1);
    });
    rx
}
