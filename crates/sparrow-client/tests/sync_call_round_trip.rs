use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sparrow_client::{Client, ClientConfig};
use sparrow_protocol::{
    BinaryDecode, BinaryEncode, BinaryProtocol, DispatchError, Message, PayloadReader, PayloadWriter, ProtocolRegistry,
    SchemaProtocol,
};
use sparrow_server::{worker, ServerConfig};

#[derive(Default, Serialize, Deserialize)]
struct EchoReq {
    info: String,
}
impl Message for EchoReq {
    const URI: u32 = 0x11;
}

#[derive(Default, Serialize, Deserialize)]
struct EchoRsp {
    info: String,
}
impl Message for EchoRsp {
    const URI: u32 = 0x12;
}

/// Scenario 1: a schema-described echo handler reached through
/// `Client::call_schema`, the framework's ordinary synchronous path.
#[test]
fn schema_echo_round_trip_through_sync_client() {
    let port = 24_804;

    let mut schema = SchemaProtocol::new();
    schema.register_handler::<EchoReq, EchoRsp, _>(|req, rsp| rsp.info = req.info.clone()).unwrap();
    let mut registry = ProtocolRegistry::new();
    registry.install(Box::new(schema));
    let registry = Arc::new(registry);

    let config = ServerConfig::new("127.0.0.1", port).with_worker_num(1);
    thread::spawn(move || worker::run_worker(config, registry));
    thread::sleep(Duration::from_millis(200));

    let cfg = ClientConfig::new("127.0.0.1", port);
    let mut client = Client::connect(&cfg).expect("client connect");

    let deadline = Instant::now() + Duration::from_secs(1);
    let rsp: EchoRsp = client.call_schema(&EchoReq { info: "hello".into() }, deadline).expect("call_schema");

    assert_eq!(rsp.info, "hello");
}

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
        let extend = r.read_container(|r| {
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

/// Scenario 2: a binary-family composite payload (list-of-map extend
/// field) reached through `Client::call_binary`.
#[test]
fn binary_composite_payload_round_trip_through_sync_client() {
    let port = 24_805;

    let mut binary = BinaryProtocol::new();
    binary
        .register_handler::<BookReq, BookRsp, _>(|req, rsp| {
            rsp.result = 0;
            rsp.extend.insert(req.name.clone(), req.age.to_string());
        })
        .unwrap();
    let mut registry = ProtocolRegistry::new();
    registry.install(Box::new(binary));
    let registry = Arc::new(registry);

    let config = ServerConfig::new("127.0.0.1", port).with_worker_num(1);
    thread::spawn(move || worker::run_worker(config, registry));
    thread::sleep(Duration::from_millis(200));

    let cfg = ClientConfig::new("127.0.0.1", port);
    let mut client = Client::connect(&cfg).expect("client connect");

    let req = BookReq {
        name: "jesse".into(),
        age: 26,
        book: vec!["aaa".into(), "bbb".into()],
        extend: vec![HashMap::from([("hello".to_string(), "world".to_string())])],
    };

    let deadline = Instant::now() + Duration::from_secs(1);
    let rsp: BookRsp = client.call_binary(&req, deadline).expect("call_binary");

    assert_eq!(rsp.result, 0);
    assert_eq!(rsp.extend.get("jesse"), Some(&"26".to_string()));
}
