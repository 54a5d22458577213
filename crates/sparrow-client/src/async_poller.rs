use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use mio::unix::pipe;
use sparrow_net::Connection;
use sparrow_poller::{Poller, Ready};
use sparrow_protocol::ProtocolRegistry;
use sparrow_wire::codec;
use tracing::warn;

use crate::client::AsyncHandle;
use crate::error::ClientError;

/// A client connection waiting to be handed to the background poller's
/// event loop. Queued by [`spawn`], drained by the loop thread itself so
/// the two never touch the same `Poller` concurrently.
struct PendingRegistration {
    fd: RawFd,
    conn: Weak<Mutex<Connection>>,
    registry: Arc<ProtocolRegistry>,
}

struct Registered {
    conn: Weak<Mutex<Connection>>,
    registry: Arc<ProtocolRegistry>,
}

type ConnMap = Rc<RefCell<HashMap<RawFd, Registered>>>;

/// Process-wide background read-loop for every [`AsyncHandle`] in the
/// program: a single dedicated thread owning its own [`Poller`], woken up
/// through a `mio` pipe whenever `spawn` queues a new connection. Holding
/// only a `Weak` to each `Connection` is what lets a dropped `AsyncHandle`
/// tear its registration down instead of pinning the socket open forever —
/// a strong `Arc` cycle between the poller and the connection it polls
/// would otherwise never release either side.
struct AsyncPoller {
    wake_tx: Mutex<pipe::Sender>,
    pending: Arc<Mutex<VecDeque<PendingRegistration>>>,
}

static POLLER: OnceLock<AsyncPoller> = OnceLock::new();

fn poller() -> &'static AsyncPoller {
    POLLER.get_or_init(|| {
        let (tx, rx) = pipe::new().expect("failed to create async client wake pipe");
        let pending = Arc::new(Mutex::new(VecDeque::new()));
        let thread_pending = Arc::clone(&pending);
        std::thread::Builder::new()
            .name("sparrow-client-async".into())
            .spawn(move || run_async_loop(rx, thread_pending))
            .expect("failed to spawn async client poller thread");
        AsyncPoller { wake_tx: Mutex::new(tx), pending }
    })
}

/// Wraps `conn` for shared access, queues it with the background poller,
/// and wakes the loop thread up to pick it up.
pub fn spawn(conn: Connection, registry: Arc<ProtocolRegistry>) -> Result<AsyncHandle, ClientError> {
    let fd = conn.fd().expect("connection has an active socket");
    let shared = Arc::new(Mutex::new(conn));
    let poller = self::poller();
    poller.pending.lock().expect("pending queue poisoned").push_back(PendingRegistration {
        fd,
        conn: Arc::downgrade(&shared),
        registry,
    });
    wake(poller)?;
    Ok(AsyncHandle { conn: shared })
}

fn wake(poller: &AsyncPoller) -> Result<(), ClientError> {
    use std::io::Write;
    let mut tx = poller.wake_tx.lock().expect("wake pipe poisoned");
    match tx.write_all(&[1u8]) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn run_async_loop(wake_rx: pipe::Receiver, pending: Arc<Mutex<VecDeque<PendingRegistration>>>) {
    let mut poller = match Poller::new(1024) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "failed to create async client poller");
            return;
        }
    };

    let wake_rx = Rc::new(RefCell::new(wake_rx));
    let wake_fd = wake_rx.borrow().as_raw_fd();
    if let Err(e) = poller.add_fd(wake_fd, &mut *wake_rx.borrow_mut(), Ready::READ) {
        warn!(error = %e, "failed to register async client wake pipe");
        return;
    }

    let conns: ConnMap = Rc::new(RefCell::new(HashMap::new()));
    {
        let wake_rx = Rc::clone(&wake_rx);
        let conns = Rc::clone(&conns);
        poller.set_fd_read_callback(wake_fd, move |poller, _fd| {
            drain_wake_pipe(&wake_rx);
            install_pending(poller, &conns, &pending);
        });
    }

    if let Err(e) = poller.run_loop() {
        warn!(error = %e, "async client poller loop stopped");
    }
}

fn drain_wake_pipe(wake_rx: &Rc<RefCell<pipe::Receiver>>) {
    use std::io::Read;
    let mut scratch = [0u8; 64];
    let mut rx = wake_rx.borrow_mut();
    loop {
        match rx.read(&mut scratch) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "async client wake pipe read failed");
                break;
            }
        }
    }
}

fn install_pending(poller: &mut Poller, conns: &ConnMap, pending: &Arc<Mutex<VecDeque<PendingRegistration>>>) {
    let drained: Vec<PendingRegistration> = pending.lock().expect("pending queue poisoned").drain(..).collect();
    for reg in drained {
        let Some(shared) = reg.conn.upgrade() else { continue };
        {
            let mut conn = shared.lock().expect("connection poisoned");
            let Some(stream) = conn.stream.as_mut() else { continue };
            if let Err(e) = poller.add_fd(reg.fd, stream, Ready::READ) {
                warn!(error = %e, fd = reg.fd, "failed to register async client connection");
                continue;
            }
        }

        conns.borrow_mut().insert(reg.fd, Registered { conn: reg.conn.clone(), registry: Arc::clone(&reg.registry) });

        let conns_cb = Rc::clone(conns);
        poller.set_fd_read_callback(reg.fd, move |poller, fd| on_async_readable(poller, fd, &conns_cb));
    }
}

fn on_async_readable(poller: &mut Poller, fd: RawFd, conns: &ConnMap) {
    let entry = conns.borrow().get(&fd).map(|r| (r.conn.clone(), Arc::clone(&r.registry)));
    let Some((weak_conn, registry)) = entry else { return };
    let Some(shared) = weak_conn.upgrade() else {
        remove_async_entry(poller, fd, conns);
        return;
    };

    let mut broken = false;
    {
        let mut conn = shared.lock().expect("connection poisoned");
        match conn.tcp_recv() {
            Ok(true) => {}
            Ok(false) => broken = true,
            Err(e) => {
                warn!(error = %e, fd, "async client recv failed");
                broken = true;
            }
        }

        if !broken {
            loop {
                match codec::try_extract_frame(&mut conn.recv_buf) {
                    Ok(Some(frame)) => {
                        if let Err(e) =
                            registry.dispatch(frame.header.protocol_type, frame.header.protocol_uri, &frame.payload)
                        {
                            warn!(error = %e, fd, "async client dispatch failed");
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, fd, "async client frame decode failed");
                        broken = true;
                        break;
                    }
                }
            }
        }

        if !broken && matches!(conn.status, sparrow_net::ConnStatus::Broken) {
            broken = true;
        }
    }

    if broken {
        remove_async_entry(poller, fd, conns);
    }
}

/// Drops `fd`'s entry from the loop's table. If the connection is still
/// alive we own a proper `Source` to deregister; if the `AsyncHandle` was
/// dropped first (the `Weak` no longer upgrades, and the socket is already
/// gone with it) there is nothing left to deregister, so the slot is just
/// cleared via [`Poller::forget_fd`].
fn remove_async_entry(poller: &mut Poller, fd: RawFd, conns: &ConnMap) {
    let Some(entry) = conns.borrow_mut().remove(&fd) else { return };
    match entry.conn.upgrade() {
        Some(shared) => {
            let mut conn = shared.lock().expect("connection poisoned");
            if let Some(mut stream) = conn.stream.take() {
                let _ = poller.del_fd(fd, &mut stream);
            }
        }
        None => poller.forget_fd(fd),
    }
}
