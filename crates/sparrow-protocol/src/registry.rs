use sparrow_wire::ProtocolKind;

use crate::dispatcher::DispatchOutcome;
use crate::error::DispatchError;
use crate::protocol::ProtocolFamily;

/// Routes `header.protocol_type -> Protocol`: one slot per [`ProtocolKind`],
/// populated at startup before the event loop runs.
#[derive(Default)]
pub struct ProtocolRegistry {
    schema: Option<Box<dyn ProtocolFamily>>,
    binary: Option<Box<dyn ProtocolFamily>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, protocol: Box<dyn ProtocolFamily>) {
        match protocol.kind() {
            ProtocolKind::Schema => self.schema = Some(protocol),
            ProtocolKind::Binary => self.binary = Some(protocol),
        }
    }

    fn get(&self, kind: ProtocolKind) -> Option<&dyn ProtocolFamily> {
        match kind {
            ProtocolKind::Schema => self.schema.as_deref(),
            ProtocolKind::Binary => self.binary.as_deref(),
        }
    }

    /// Looks up the protocol by `protocol_type` and routes the frame body
    /// through it. An unpopulated slot is a frame error (unknown protocol
    /// type).
    pub fn dispatch(&self, protocol_type: u8, uri: u32, payload: &[u8]) -> Result<DispatchOutcome, DispatchError> {
        let kind = ProtocolKind::from_u8(protocol_type).map_err(|_| DispatchError::UnknownProtocolType(protocol_type))?;
        let protocol = self.get(kind).ok_or(DispatchError::UnknownProtocolType(protocol_type))?;
        protocol.dispatch(uri, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaProtocol;

    #[test]
    fn unpopulated_slot_is_rejected() {
        let registry = ProtocolRegistry::new();
        let err = registry.dispatch(0, 1, &[]).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownProtocolType(0)));
    }

    #[test]
    fn routes_to_installed_family() {
        let mut registry = ProtocolRegistry::new();
        registry.install(Box::new(SchemaProtocol::new()));
        let err = registry.dispatch(0, 0xDEAD, &[]).unwrap_err();
        assert!(matches!(err, DispatchError::UnregisteredUri(0xDEAD)));
    }
}
