pub mod buffer;
pub mod codec;
pub mod error;
pub mod frame;

pub use buffer::Buffer;
pub use codec::{try_extract_frame, write_frame, Frame};
pub use error::{BufferError, FrameError};
pub use frame::{FrameHeader, ProtocolKind, HEADER_SIZE, TRACE_ID_SIZE};
