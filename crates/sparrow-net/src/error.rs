use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Buffer(#[from] sparrow_wire::BufferError),
}
