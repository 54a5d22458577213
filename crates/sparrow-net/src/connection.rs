use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::time::Instant;

use sparrow_wire::Buffer;
use tracing::trace;

use crate::error::NetError;

/// Chunk size requested per `recv` call; the buffer grows on its own if a
/// peer keeps outrunning it.
const RX_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    None,
    Ok,
    Broken,
}

/// A pooled, reusable connection: a socket plus its own receive and send
/// buffers. `reset` returns it to a blank slate so the pool never hands out
/// residue from a previous peer.
pub struct Connection {
    pub stream: Option<mio::net::TcpStream>,
    pub status: ConnStatus,
    pub remote_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
    pub recv_buf: Buffer,
    pub send_buf: Buffer,
    pub last_active: Instant,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    pub fn new() -> Self {
        Self {
            stream: None,
            status: ConnStatus::None,
            remote_addr: None,
            local_addr: None,
            recv_buf: Buffer::new(),
            send_buf: Buffer::new(),
            last_active: Instant::now(),
        }
    }

    pub fn accept(stream: mio::net::TcpStream, remote_addr: SocketAddr) -> Self {
        let local_addr = stream.local_addr().ok();
        Self {
            stream: Some(stream),
            status: ConnStatus::Ok,
            remote_addr: Some(remote_addr),
            local_addr,
            recv_buf: Buffer::new(),
            send_buf: Buffer::new(),
            last_active: Instant::now(),
        }
    }

    /// Client-side counterpart to [`Connection::accept`]: wraps a socket
    /// this side dialed out, rather than one a listener took in.
    pub fn connected(stream: mio::net::TcpStream, remote_addr: SocketAddr) -> Self {
        Self::accept(stream, remote_addr)
    }

    /// Rearms an already-pooled (and therefore already-reset) connection
    /// with a freshly accepted socket, keeping its existing buffer
    /// allocations instead of discarding them the way [`Connection::accept`]
    /// does for a standalone instance.
    pub fn activate(&mut self, stream: mio::net::TcpStream, remote_addr: SocketAddr) {
        let local_addr = stream.local_addr().ok();
        self.stream = Some(stream);
        self.status = ConnStatus::Ok;
        self.remote_addr = Some(remote_addr);
        self.local_addr = local_addr;
        self.last_active = Instant::now();
    }

    pub fn has_pending_rsp(&self) -> bool {
        !self.send_buf.is_empty()
    }

    pub fn fd(&self) -> Option<std::os::fd::RawFd> {
        use std::os::fd::AsRawFd;
        self.stream.as_ref().map(mio::net::TcpStream::as_raw_fd)
    }

    /// Drains the socket into `recv_buf` until it would block, hits EOF, or
    /// errors. Returns `Ok(true)` if the connection is still alive.
    pub fn tcp_recv(&mut self) -> Result<bool, NetError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(false);
        };
        loop {
            let chunk = self.recv_buf.append_at(RX_CHUNK)?;
            match stream.read(chunk) {
                Ok(0) => {
                    self.status = ConnStatus::Broken;
                    return Ok(false);
                }
                Ok(n) => {
                    self.recv_buf.commit(n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.status = ConnStatus::Broken;
                    return Err(e.into());
                }
            }
        }
    }

    /// Flushes as much of `send_buf` as the socket accepts right now.
    /// Returns `Ok(true)` if the connection is still alive; callers should
    /// check `has_pending_rsp` afterwards to decide whether WRITE interest
    /// is still needed.
    pub fn tcp_send(&mut self) -> Result<bool, NetError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(false);
        };
        loop {
            if self.send_buf.is_empty() {
                return Ok(true);
            }
            let chunk = self.send_buf.read_ptr();
            match stream.write(chunk) {
                Ok(0) => return Ok(true),
                Ok(n) => {
                    self.send_buf.consume(n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.status = ConnStatus::Broken;
                    return Err(e.into());
                }
            }
        }
    }

    pub fn shutdown_write(&self) -> io::Result<()> {
        if let Some(stream) = &self.stream {
            stream.shutdown(std::net::Shutdown::Write)?;
        }
        Ok(())
    }

    /// Returns this connection to a blank, reusable state. The caller is
    /// responsible for having already deregistered and closed the fd.
    pub fn reset(&mut self) {
        trace!(?self.remote_addr, "resetting connection for reuse");
        self.stream = None;
        self.status = ConnStatus::None;
        self.remote_addr = None;
        self.local_addr = None;
        self.recv_buf.reset();
        self.send_buf.reset();
    }
}
