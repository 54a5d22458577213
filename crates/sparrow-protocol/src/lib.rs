pub mod binary;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod payload;
pub mod protocol;
pub mod registry;
pub mod schema;

pub use binary::{BinaryDecode, BinaryEncode, BinaryProtocol};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::DispatchError;
pub use message::Message;
pub use payload::{PayloadReader, PayloadWriter};
pub use protocol::ProtocolFamily;
pub use registry::ProtocolRegistry;
pub use schema::SchemaProtocol;
