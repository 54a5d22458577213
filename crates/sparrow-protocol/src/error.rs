use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no handler registered for uri {0:#x}")]
    UnregisteredUri(u32),
    #[error("request and response uri must differ (both were {0:#x})")]
    UriCollision(u32),
    #[error("schema codec error: {0}")]
    Schema(#[from] bincode::Error),
    #[error("binary payload error: {0}")]
    Binary(&'static str),
    #[error("unknown protocol type {0}")]
    UnknownProtocolType(u8),
}
