/// The shutdown state machine (`§4.F`/design note "Shutdown as a state
/// machine"): `Running -> Draining -> Stopped`. Shared between
/// `scratch-store` (the sweeper stops on the next wake-up once draining)
/// and `scratch-server` (the request gate), so both crates agree on one
/// type rather than polling a bool flag each invents independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Draining,
    Stopped,
}

impl Default for ServerState {
    fn default() -> Self {
        ServerState::Running
    }
}
