/// Initializes the process-wide `tracing` subscriber. Library crates only
/// emit events; a binary calls this once, at the top of `main`.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
