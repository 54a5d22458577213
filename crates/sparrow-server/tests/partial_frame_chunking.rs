use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sparrow_protocol::{Message, ProtocolRegistry, SchemaProtocol};
use sparrow_server::{worker, ServerConfig};
use sparrow_wire::{FrameHeader, ProtocolKind, HEADER_SIZE};

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

/// A request well over 200 bytes is written as a stream of 25-byte TCP
/// writes with 5 ms sleeps between them; the handler must still fire
/// exactly once on the reassembled frame.
#[test]
fn handler_fires_once_for_a_chunked_frame() {
    let port = 24_801;
    let handler_calls = Arc::new(AtomicU32::new(0));

    let mut schema = SchemaProtocol::new();
    {
        let calls = Arc::clone(&handler_calls);
        schema
            .register_handler::<EchoReq, EchoRsp, _>(move |req, rsp| {
                calls.fetch_add(1, Ordering::SeqCst);
                rsp.info = req.info.clone();
            })
            .unwrap();
    }
    let mut registry = ProtocolRegistry::new();
    registry.install(Box::new(schema));
    let registry = Arc::new(registry);

    let config = ServerConfig::new("127.0.0.1", port).with_worker_num(1);
    thread::spawn(move || worker::run_worker(config, registry));
    thread::sleep(Duration::from_millis(200));

    let info = "x".repeat(150);
    let payload = SchemaProtocol::serialize(&EchoReq { info: info.clone() }).unwrap();
    let header = FrameHeader::new(payload.len(), ProtocolKind::Schema, EchoReq::URI);

    let mut wire_header = [0u8; HEADER_SIZE];
    header.encode(&mut wire_header);
    let mut frame = Vec::with_capacity(wire_header.len() + payload.len());
    frame.extend_from_slice(&wire_header);
    frame.extend_from_slice(&payload);
    assert!(frame.len() > 200, "test fixture should exceed 200 bytes of frame");

    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect to worker");
    for chunk in frame.chunks(25) {
        stream.write_all(chunk).expect("partial write");
        thread::sleep(Duration::from_millis(5));
    }

    let mut rsp_header_bytes = [0u8; HEADER_SIZE];
    stream.read_exact(&mut rsp_header_bytes).expect("read response header");
    let rsp_header = FrameHeader::decode(&rsp_header_bytes).unwrap();
    let mut rsp_payload = vec![0u8; rsp_header.payload_len()];
    stream.read_exact(&mut rsp_payload).expect("read response payload");
    let rsp: EchoRsp = SchemaProtocol::deserialize(&rsp_payload).unwrap();

    assert_eq!(rsp.info, info);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 1);
}
