pub mod connection;
pub mod error;
pub mod pool;
pub mod socket;

pub use connection::{ConnStatus, Connection};
pub use error::NetError;
pub use pool::{ConnectionPool, PooledConnection};
