use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Net(#[from] sparrow_net::NetError),
    #[error("fork failed: {0}")]
    Fork(#[from] nix::Error),
    #[error("dispatch error: {0}")]
    Dispatch(#[from] sparrow_protocol::DispatchError),
}
