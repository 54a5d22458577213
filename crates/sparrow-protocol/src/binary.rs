use sparrow_wire::ProtocolKind;

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::DispatchError;
use crate::message::Message;
use crate::payload::{PayloadReader, PayloadWriter};
use crate::protocol::ProtocolFamily;

/// Per-type serializer for the reflection-free binary family. Implemented
/// by hand, the way the reference implementation's generated
/// `serialize`/`unserialize` pair would be, since this family has no
/// schema to derive from.
pub trait BinaryEncode {
    fn encode(&self, writer: &mut PayloadWriter);
}

/// Per-type deserializer for the binary family.
pub trait BinaryDecode: Sized {
    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, DispatchError>;
}

/// The reflection-free binary message family (`protocol_type = 1`).
#[derive(Default)]
pub struct BinaryProtocol {
    dispatcher: Dispatcher,
}

impl BinaryProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler<REQ, RSP, F>(&mut self, handler: F) -> Result<(), DispatchError>
    where
        REQ: Message + BinaryDecode + 'static,
        RSP: Message + BinaryEncode + Default + 'static,
        F: Fn(&REQ, &mut RSP) + Send + Sync + 'static,
    {
        self.dispatcher.register_server(REQ::URI, RSP::URI, move |bytes| {
            let mut reader = PayloadReader::new(bytes);
            let req = REQ::decode(&mut reader)?;
            let mut rsp = RSP::default();
            handler(&req, &mut rsp);
            let mut writer = PayloadWriter::new();
            rsp.encode(&mut writer);
            Ok((RSP::URI, writer.into_bytes()))
        })
    }

    pub fn register_async<RSP, F>(&mut self, callback: F)
    where
        RSP: Message + BinaryDecode + 'static,
        F: Fn(RSP) + Send + Sync + 'static,
    {
        self.dispatcher.register_async(RSP::URI, move |bytes| {
            let mut reader = PayloadReader::new(bytes);
            let rsp = RSP::decode(&mut reader)?;
            callback(rsp);
            Ok(())
        });
    }

    pub fn serialize<T: BinaryEncode>(msg: &T) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        msg.encode(&mut writer);
        writer.into_bytes()
    }

    pub fn deserialize<T: BinaryDecode>(bytes: &[u8]) -> Result<T, DispatchError> {
        let mut reader = PayloadReader::new(bytes);
        T::decode(&mut reader)
    }
}

impl ProtocolFamily for BinaryProtocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Binary
    }

    fn dispatch(&self, uri: u32, payload: &[u8]) -> Result<DispatchOutcome, DispatchError> {
        self.dispatcher.dispatch(uri, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct BookReq {
        name: String,
        age: u32,
        book: Vec<String>,
        extend: Vec<HashMap<String, String>>,
    }
    impl Message for BookReq {
        const URI: u32 = 0xC865;
    }
    impl BinaryEncode for BookReq {
        fn encode(&self, w: &mut PayloadWriter) {
            w.push_string(&self.name);
            w.push_u32(self.age);
            w.push_container(&self.book, |w, s| w.push_string(s));
            w.push_container(&self.extend, |w, map| {
                let pairs: Vec<(String, String)> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                w.push_container(&pairs, |w, (k, v)| {
                    w.push_pair(|w| w.push_string(k), |w| w.push_string(v));
                });
            });
        }
    }
    impl BinaryDecode for BookReq {
        fn decode(r: &mut PayloadReader<'_>) -> Result<Self, DispatchError> {
            let name = r.read_string()?;
            let age = r.read_u32()?;
            let book = r.read_container(|r| r.read_string())?;
            let extend = r
                .read_container(|r| {
                    let pairs = r.read_container(|r| r.read_pair(|r| r.read_string(), |r| r.read_string()))?;
                    Ok(pairs.into_iter().collect::<HashMap<_, _>>())
                })?;
            Ok(Self { name, age, book, extend })
        }
    }

    #[derive(Default)]
    struct BookRsp {
        result: u32,
        extend: HashMap<String, String>,
    }
    impl Message for BookRsp {
        const URI: u32 = 0xC866;
    }
    impl BinaryEncode for BookRsp {
        fn encode(&self, w: &mut PayloadWriter) {
            w.push_u32(self.result);
            let pairs: Vec<(String, String)> = self.extend.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            w.push_container(&pairs, |w, (k, v)| {
                w.push_pair(|w| w.push_string(k), |w| w.push_string(v));
            });
        }
    }
    impl BinaryDecode for BookRsp {
        fn decode(r: &mut PayloadReader<'_>) -> Result<Self, DispatchError> {
            let result = r.read_u32()?;
            let pairs = r.read_container(|r| r.read_pair(|r| r.read_string(), |r| r.read_string()))?;
            Ok(Self { result, extend: pairs.into_iter().collect() })
        }
    }

    #[test]
    fn composite_payload_round_trips_through_binary_dispatch() {
        let mut protocol = BinaryProtocol::new();
        protocol
            .register_handler::<BookReq, BookRsp, _>(|req, rsp| {
                rsp.result = 0;
                rsp.extend.insert(req.name.clone(), req.age.to_string());
            })
            .unwrap();

        let req = BookReq {
            name: "jesse".into(),
            age: 26,
            book: vec!["aaa".into(), "bbb".into()],
            extend: vec![HashMap::from([("hello".to_string(), "world".to_string())])],
        };
        let bytes = BinaryProtocol::serialize(&req);
        let outcome = protocol.dispatch(BookReq::URI, &bytes).unwrap();
        let DispatchOutcome::Response { uri, bytes } = outcome else {
            panic!("expected a response");
        };
        assert_eq!(uri, BookRsp::URI);
        let rsp: BookRsp = BinaryProtocol::deserialize(&bytes).unwrap();
        assert_eq!(rsp.result, 0);
        assert_eq!(rsp.extend.get("jesse"), Some(&"26".to_string()));
    }
}
