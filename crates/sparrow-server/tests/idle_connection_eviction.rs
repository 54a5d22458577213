use std::io::Read;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sparrow_protocol::ProtocolRegistry;
use sparrow_server::{worker, ServerConfig};

/// A connection that never sends anything must be closed by the reaper
/// once it has sat idle past `idle_timeout`, well inside a generous
/// outer bound.
#[test]
fn silent_connection_is_evicted_after_idle_timeout() {
    let port = 24_802;
    let registry = Arc::new(ProtocolRegistry::new());

    let config = ServerConfig::new("127.0.0.1", port)
        .with_worker_num(1)
        .with_idle_timeout(Duration::from_secs(2));
    thread::spawn(move || worker::run_worker(config, registry));
    thread::sleep(Duration::from_millis(200));

    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect to worker");
    stream.set_read_timeout(Some(Duration::from_secs(7))).unwrap();

    let deadline = Instant::now() + Duration::from_secs(7);
    let mut buf = [0u8; 16];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => panic!("server should never send data to a silent connection"),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => panic!("unexpected read error: {e}"),
        }
        assert!(Instant::now() < deadline, "connection was not evicted within the idle window");
        thread::sleep(Duration::from_millis(100));
    }
}
