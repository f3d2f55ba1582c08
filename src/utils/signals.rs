//! Signal handling for graceful shutdown

use futures::stream::StreamExt;
use signal_hook_tokio::Signals;

/// Wait for a shutdown signal (SIGTERM, SIGINT, SIGQUIT) and return the
/// signal number that arrived.
pub async fn shutdown_signal() -> Option<i32> {
    let mut signals = Signals::new([
        signal_hook::consts::SIGTERM,
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGQUIT,
    ])
    .expect("failed to register signal handler");

    signals.next().await
}
