pub mod config;
pub mod error;
mod signal;
pub mod watcher;
pub mod worker;

pub use config::ServerConfig;
pub use error::ServerError;

/// Starts the full watcher/worker process split: forks `config.worker_num`
/// workers, each running its own event loop against `registry`, and blocks
/// the calling process (the watcher) until every worker has exited.
pub fn run(config: ServerConfig, registry: sparrow_protocol::ProtocolRegistry) -> Result<(), ServerError> {
    watcher::run(config, registry)
}
