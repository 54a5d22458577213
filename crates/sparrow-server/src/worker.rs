use std::cell::RefCell;
use std::collections::HashMap;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use sparrow_net::pool::{ConnectionPool, PooledConnection};
use sparrow_poller::{Poller, Ready};
use sparrow_protocol::{DispatchOutcome, ProtocolRegistry};
use sparrow_wire::{codec, FrameHeader};
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::signal::SelfPipe;

const IDLE_REAP_PERIOD: Duration = Duration::from_secs(5);

type ConnMap = Rc<RefCell<HashMap<RawFd, PooledConnection>>>;

/// Runs one worker's event loop until it receives `SIGTERM`/`SIGINT`.
/// Owns its own listening socket (bound `SO_REUSEADDR`+`SO_REUSEPORT`),
/// its connection pool, and the live `fd -> Connection` map — none of this
/// state is shared with any other worker or with the watcher.
pub fn run_worker(config: ServerConfig, registry: Arc<ProtocolRegistry>) -> Result<(), ServerError> {
    let mut poller = Poller::new(1024)?;
    let mut signal_pipe = SelfPipe::new(&[Signal::SIGTERM, Signal::SIGINT])?;
    let sig_fd = signal_pipe.receiver.as_raw_fd();
    poller.add_fd(sig_fd, &mut signal_pipe.receiver, Ready::READ)?;
    let signal_pipe = Rc::new(RefCell::new(signal_pipe));
    {
        let signal_pipe = Rc::clone(&signal_pipe);
        poller.set_fd_read_callback(sig_fd, move |poller, _fd| {
            signal_pipe.borrow_mut().drain();
            info!("worker received shutdown signal");
            poller.stop();
        });
    }

    let addr = config.socket_addr()?;
    let mut listener = sparrow_net::socket::listen_reuseport(addr, 1024)?;
    let listener_fd = listener.as_raw_fd();
    poller.add_fd(listener_fd, &mut listener, Ready::READ)?;
    info!(%addr, "worker listening");

    let pool = ConnectionPool::with_capacity(64.min(config.max_connection_num));
    let connections: ConnMap = Rc::new(RefCell::new(HashMap::new()));
    let max_connection_num = config.max_connection_num;
    let socket_buf_size = config.socket_buf_size;

    {
        let pool = Arc::clone(&pool);
        let connections = Rc::clone(&connections);
        let registry = Arc::clone(&registry);
        poller.set_fd_read_callback(listener_fd, move |poller, _fd| {
            accept_loop(poller, &mut listener, &pool, &connections, &registry, max_connection_num, socket_buf_size);
        });
    }

    {
        let connections = Rc::clone(&connections);
        let idle_timeout = config.idle_timeout;
        poller.add_timer(IDLE_REAP_PERIOD, true, Box::new(move |poller| {
            reap_idle(poller, &connections, idle_timeout);
        }));
    }

    poller.run_loop()?;
    info!("worker event loop stopped");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn accept_loop(
    poller: &mut Poller,
    listener: &mut mio::net::TcpListener,
    pool: &Arc<ConnectionPool>,
    connections: &ConnMap,
    registry: &Arc<ProtocolRegistry>,
    max_connection_num: usize,
    socket_buf_size: Option<usize>,
) {
    loop {
        let (stream, remote_addr) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "accept failed");
                return;
            }
        };

        if connections.borrow().len() >= max_connection_num {
            debug!(%remote_addr, "max connection count reached, dropping accepted socket");
            drop(stream);
            continue;
        }

        let new_fd = stream.as_raw_fd();
        if new_fd as usize >= sparrow_poller::MAX_FD {
            warn!(fd = new_fd, %remote_addr, "accepted fd exceeds poller capacity, dropping socket");
            drop(stream);
            continue;
        }

        if let Some(size) = socket_buf_size {
            sparrow_net::socket::set_buf_size(&stream, size);
        }

        let mut conn = pool.get();
        conn.activate(stream, remote_addr);
        connections.borrow_mut().insert(new_fd, conn);

        {
            let mut conns = connections.borrow_mut();
            let conn = conns.get_mut(&new_fd).expect("just inserted");
            let source = conn.stream.as_mut().expect("just activated");
            if let Err(e) = poller.add_fd(new_fd, source, Ready::READ) {
                warn!(error = %e, "failed to register accepted connection");
                drop(conns);
                connections.borrow_mut().remove(&new_fd);
                continue;
            }
        }

        let read_cb = {
            let connections = Rc::clone(connections);
            let registry = Arc::clone(registry);
            move |poller: &mut Poller, fd: RawFd| on_readable(poller, fd, &connections, &registry)
        };
        let write_cb = {
            let connections = Rc::clone(connections);
            move |poller: &mut Poller, fd: RawFd| on_writable(poller, fd, &connections)
        };
        poller.set_fd_read_callback(new_fd, read_cb);
        poller.set_fd_write_callback(new_fd, write_cb);
        trace!(%remote_addr, fd = new_fd, "accepted connection");
    }
}

fn on_readable(poller: &mut Poller, fd: RawFd, connections: &ConnMap, registry: &Arc<ProtocolRegistry>) {
    let mut broken = false;
    {
        let mut conns = connections.borrow_mut();
        let Some(conn) = conns.get_mut(&fd) else { return };

        match conn.tcp_recv() {
            Ok(true) => {}
            Ok(false) => broken = true,
            Err(e) => {
                warn!(error = %e, fd, "recv failed");
                broken = true;
            }
        }

        if !broken {
            conn.last_active = Instant::now();
            loop {
                match codec::try_extract_frame(&mut conn.recv_buf) {
                    Ok(Some(frame)) => {
                        match registry.dispatch(frame.header.protocol_type, frame.header.protocol_uri, &frame.payload) {
                            Ok(DispatchOutcome::Response { uri, bytes }) => {
                                let header = FrameHeader::new_raw(bytes.len(), frame.header.protocol_type, uri)
                                    .with_trace_id(frame.header.trace_id);
                                if codec::write_frame(&mut conn.send_buf, &header, &bytes).is_err() {
                                    warn!(fd, "send buffer full, tearing down connection");
                                    broken = true;
                                    break;
                                }
                            }
                            Ok(DispatchOutcome::Delivered) => {}
                            Err(e) => {
                                warn!(error = %e, fd, "dispatch failed, tearing down connection");
                                broken = true;
                                break;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, fd, "frame decode failed, tearing down connection");
                        broken = true;
                        break;
                    }
                }
            }
        }

        if !broken && conn.has_pending_rsp() {
            match conn.tcp_send() {
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, fd, "send failed");
                    broken = true;
                }
            }
        }

        if !broken && matches!(conn.status, sparrow_net::ConnStatus::Broken) {
            broken = true;
        }

        if !broken {
            let mask = if conn.has_pending_rsp() { Ready::READ | Ready::WRITE } else { Ready::READ };
            let source = conn.stream.as_mut().expect("connection has an active socket");
            if let Err(e) = poller.alter_event(fd, source, mask) {
                warn!(error = %e, fd, "failed to update interest mask");
                broken = true;
            }
        }
    }

    if broken {
        teardown(poller, fd, connections);
    }
}

fn on_writable(poller: &mut Poller, fd: RawFd, connections: &ConnMap) {
    let mut broken = false;
    {
        let mut conns = connections.borrow_mut();
        let Some(conn) = conns.get_mut(&fd) else { return };
        match conn.tcp_send() {
            Ok(_) if matches!(conn.status, sparrow_net::ConnStatus::Broken) => broken = true,
            Ok(_) => {
                if !conn.has_pending_rsp() {
                    let source = conn.stream.as_mut().expect("connection has an active socket");
                    if let Err(e) = poller.alter_event(fd, source, Ready::READ) {
                        warn!(error = %e, fd, "failed to clear write interest");
                        broken = true;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, fd, "send failed");
                broken = true;
            }
        }
    }
    if broken {
        teardown(poller, fd, connections);
    }
}

fn reap_idle(poller: &mut Poller, connections: &ConnMap, idle_timeout: Duration) {
    let now = Instant::now();
    let idle_fds: Vec<RawFd> = connections
        .borrow()
        .iter()
        .filter(|(_, conn)| now.duration_since(conn.last_active) > idle_timeout)
        .map(|(fd, _)| *fd)
        .collect();

    for fd in idle_fds {
        let mut ready_to_close = false;
        {
            let mut conns = connections.borrow_mut();
            if let Some(conn) = conns.get_mut(&fd) {
                let _ = conn.tcp_send();
                if conn.has_pending_rsp() {
                    conn.last_active = now;
                } else {
                    let _ = conn.shutdown_write();
                    ready_to_close = true;
                }
            }
        }
        if ready_to_close {
            debug!(fd, "idle connection evicted");
            teardown(poller, fd, connections);
        }
    }
}

fn teardown(poller: &mut Poller, fd: RawFd, connections: &ConnMap) {
    if let Some(mut conn) = connections.borrow_mut().remove(&fd) {
        if let Some(mut source) = conn.stream.take() {
            let _ = poller.del_fd(fd, &mut source);
        }
        conn.reset();
        // `conn` (a `PooledConnection`) drops here, returning it to the pool.
    }
}
