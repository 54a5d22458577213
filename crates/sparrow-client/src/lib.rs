mod async_poller;
pub mod client;
pub mod config;
pub mod connect;
pub mod error;

pub use client::{AsyncHandle, Client};
pub use config::ClientConfig;
pub use error::ClientError;
