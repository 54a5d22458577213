use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Net(#[from] sparrow_net::NetError),
    #[error("could not resolve host")]
    NoAddressResolved,
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("call timed out before a response arrived")]
    CallTimeout,
    #[error(transparent)]
    Dispatch(#[from] sparrow_protocol::DispatchError),
    #[error("frame error: {0}")]
    Frame(#[from] sparrow_wire::FrameError),
    #[error("buffer error: {0}")]
    Buffer(#[from] sparrow_wire::BufferError),
    #[error("response uri {got:#x} did not match the expected response uri {expected:#x}")]
    UnexpectedUri { expected: u32, got: u32 },
    #[error("response protocol type {0} did not match the request's protocol family")]
    UnexpectedProtocolType(u8),
}
