use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer cannot grow past the configured maximum capacity")]
    CapacityExceeded,
}

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame shorter than the header")]
    TooShort,
    #[error("frame not fully buffered yet")]
    Incomplete,
    #[error("unknown protocol type {0}")]
    UnknownProtocolType(u8),
}
