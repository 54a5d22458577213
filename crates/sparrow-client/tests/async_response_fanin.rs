use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sparrow_client::{Client, ClientConfig};
use sparrow_protocol::{Message, ProtocolRegistry, SchemaProtocol};
use sparrow_server::{worker, ServerConfig};

#[derive(Default, Serialize, Deserialize)]
struct EchoReq {
    loginid: u64,
}
impl Message for EchoReq {
    const URI: u32 = 0x11;
}

#[derive(Default, Serialize, Deserialize)]
struct EchoRsp {
    loginid: u64,
}
impl Message for EchoRsp {
    const URI: u32 = 0x12;
}

/// 10,000 requests issued back-to-back over one async handle must each
/// produce exactly one callback invocation, with no `loginid` delivered
/// twice.
#[test]
fn ten_thousand_async_calls_each_answer_exactly_once() {
    let port = 24_803;

    let mut server_schema = SchemaProtocol::new();
    server_schema
        .register_handler::<EchoReq, EchoRsp, _>(|req, rsp| rsp.loginid = req.loginid)
        .unwrap();
    let mut server_registry = ProtocolRegistry::new();
    server_registry.install(Box::new(server_schema));
    let server_registry = Arc::new(server_registry);

    let config = ServerConfig::new("127.0.0.1", port).with_worker_num(1);
    thread::spawn(move || worker::run_worker(config, server_registry));
    thread::sleep(Duration::from_millis(200));

    let received = Arc::new(AtomicU64::new(0));
    let seen = Arc::new(Mutex::new(HashSet::new()));

    let mut client_schema = SchemaProtocol::new();
    {
        let received = Arc::clone(&received);
        let seen = Arc::clone(&seen);
        client_schema.register_async::<EchoRsp, _>(move |rsp| {
            let first_sighting = seen.lock().expect("seen set poisoned").insert(rsp.loginid);
            assert!(first_sighting, "loginid {} delivered more than once", rsp.loginid);
            received.fetch_add(1, Ordering::SeqCst);
        });
    }
    let mut client_registry = ProtocolRegistry::new();
    client_registry.install(Box::new(client_schema));
    let client_registry = Arc::new(client_registry);

    let cfg = ClientConfig::new("127.0.0.1", port);
    let client = Client::connect(&cfg).expect("client connect");
    let handle = client.into_async(client_registry).expect("into_async");

    const TOTAL: u64 = 10_000;
    for loginid in 0..TOTAL {
        handle.send_schema(&EchoReq { loginid }).expect("send_schema");
    }

    let deadline = Instant::now() + Duration::from_secs(30);
    while received.load(Ordering::SeqCst) < TOTAL {
        assert!(Instant::now() < deadline, "only {} of {TOTAL} responses arrived", received.load(Ordering::SeqCst));
        thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(seen.lock().unwrap().len(), TOTAL as usize);
}
