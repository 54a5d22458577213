use sparrow_wire::ProtocolKind;

use crate::dispatcher::DispatchOutcome;
use crate::error::DispatchError;

/// Shared interface over the two message families: schema-described
/// (`ProtocolKind::Schema`) and reflection-free binary (`ProtocolKind::Binary`).
/// A [`crate::registry::ProtocolRegistry`] keeps one of each behind this
/// trait, selected by the frame header's `protocol_type`.
pub trait ProtocolFamily: Send + Sync {
    fn kind(&self) -> ProtocolKind;

    /// Routes `payload` (the frame body, header already stripped) through
    /// this family's dispatcher.
    fn dispatch(&self, uri: u32, payload: &[u8]) -> Result<DispatchOutcome, DispatchError>;
}
