use serde::de::DeserializeOwned;
use serde::Serialize;
use sparrow_wire::ProtocolKind;

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::DispatchError;
use crate::message::Message;
use crate::protocol::ProtocolFamily;

/// The schema-described message family (`protocol_type = 0`): payloads are
/// the `bincode` serialization of a registered `serde` type, the way a
/// schema-compiler-generated class would encode itself in the reference
/// design, minus the code generation.
#[derive(Default)]
pub struct SchemaProtocol {
    dispatcher: Dispatcher,
}

impl SchemaProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a server-side handler: `REQ::URI -> RSP::URI`. `handler`
    /// is invoked with the decoded request and a freshly defaulted
    /// response to fill in, mirroring a descriptor-factory step that
    /// materializes an empty response instance before the handler runs.
    pub fn register_handler<REQ, RSP, F>(&mut self, handler: F) -> Result<(), DispatchError>
    where
        REQ: Message + DeserializeOwned + 'static,
        RSP: Message + Serialize + Default + 'static,
        F: Fn(&REQ, &mut RSP) + Send + Sync + 'static,
    {
        self.dispatcher.register_server(REQ::URI, RSP::URI, move |bytes| {
            let req: REQ = bincode::deserialize(bytes)?;
            let mut rsp = RSP::default();
            handler(&req, &mut rsp);
            let out = bincode::serialize(&rsp)?;
            Ok((RSP::URI, out))
        })
    }

    /// Registers a client-side async response callback under `RSP::URI`.
    pub fn register_async<RSP, F>(&mut self, callback: F)
    where
        RSP: Message + DeserializeOwned + 'static,
        F: Fn(RSP) + Send + Sync + 'static,
    {
        self.dispatcher.register_async(RSP::URI, move |bytes| {
            let rsp: RSP = bincode::deserialize(bytes)?;
            callback(rsp);
            Ok(())
        });
    }

    /// Serializes a single outbound message, for callers (the client's
    /// synchronous call path) that build a frame without going through
    /// the dispatcher.
    pub fn serialize<T: Serialize>(msg: &T) -> Result<Vec<u8>, DispatchError> {
        Ok(bincode::serialize(msg)?)
    }

    pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DispatchError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl ProtocolFamily for SchemaProtocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Schema
    }

    fn dispatch(&self, uri: u32, payload: &[u8]) -> Result<DispatchOutcome, DispatchError> {
        self.dispatcher.dispatch(uri, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Default)]
    struct EchoReq {
        info: String,
    }
    impl Message for EchoReq {
        const URI: u32 = 0x11;
    }

    #[derive(Serialize, Deserialize, Default)]
    struct EchoRsp {
        info: String,
    }
    impl Message for EchoRsp {
        const URI: u32 = 0x12;
    }

    #[test]
    fn echo_round_trips_through_schema_dispatch() {
        let mut protocol = SchemaProtocol::new();
        protocol
            .register_handler::<EchoReq, EchoRsp, _>(|req, rsp| rsp.info = req.info.clone())
            .unwrap();

        let req_bytes = SchemaProtocol::serialize(&EchoReq { info: "hello".into() }).unwrap();
        let outcome = protocol.dispatch(EchoReq::URI, &req_bytes).unwrap();
        let DispatchOutcome::Response { uri, bytes } = outcome else {
            panic!("expected a response");
        };
        assert_eq!(uri, EchoRsp::URI);
        let rsp: EchoRsp = SchemaProtocol::deserialize(&bytes).unwrap();
        assert_eq!(rsp.info, "hello");
    }
}
