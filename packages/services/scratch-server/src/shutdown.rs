use std::time::Duration;

use scratch_core::ServerState;
use tokio::sync::watch;

/// The `Running -> Draining -> Stopped` gate (`§4.F`). `main.rs` spawns the
/// ctrl-c listener returned here and holds the `Sender` side; every
/// transport holds a cloned `Receiver` and checks it before starting new
/// work, the same `watch`-based pattern `scratch_store::lifecycle::run_sweeper`
/// already uses to stop sweeping once a shutdown begins.
pub fn channel() -> (watch::Sender<ServerState>, watch::Receiver<ServerState>) {
    watch::channel(ServerState::Running)
}

/// Waits for ctrl-c, flips the state to `Draining`, gives in-flight requests
/// `drain_grace` to finish, then flips to `Stopped` and forces the process to
/// exit (`§4.F`: "expiry forces process exit with outstanding operations
/// aborted"). The listener tasks `main.rs` is `.await`ing never return on
/// their own once requests stop arriving, so something has to end the
/// process once the grace period is spent; `std::process::exit` is that
/// something, same as letting the grace timer itself be the authority on
/// when "outstanding" becomes "aborted".
pub async fn run_ctrl_c_drain(sender: watch::Sender<ServerState>, drain_grace: Duration) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install ctrl-c handler; shutdown drain will not trigger");
        return;
    }
    tracing::info!("shutdown requested, draining");
    let _ = sender.send(ServerState::Draining);
    tokio::time::sleep(drain_grace).await;
    let _ = sender.send(ServerState::Stopped);
    tracing::info!("shutdown drain complete, exiting");
    std::process::exit(0);
}

/// `true` once the server should reject new tool calls (`§4.F`: "New
/// requests receive a domain error" as soon as the server transitions to
/// `Draining`, not just once fully `Stopped`). In-flight requests already
/// past this check are never interrupted by it — the gate only guards entry.
pub fn is_stopped(receiver: &watch::Receiver<ServerState>) -> bool {
    *receiver.borrow() != ServerState::Running
}
