use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use mio::{Events, Interest, Poll, Token};

use crate::config::ClientConfig;
use crate::error::ClientError;

const CONNECT_TOKEN: Token = Token(0);

/// Resolves `cfg.ip:cfg.port` and attempts a non-blocking connect to each
/// candidate address in turn, with `cfg.connect_timeout` bounding the
/// whole resolution-and-connect sequence rather than each attempt.
pub fn connect(cfg: &ClientConfig) -> Result<mio::net::TcpStream, ClientError> {
    let deadline = Instant::now() + cfg.connect_timeout;
    let addrs: Vec<SocketAddr> = (cfg.ip.as_str(), cfg.port)
        .to_socket_addrs()?
        .filter(|addr| addr.is_ipv6() == cfg.is_ipv6)
        .collect();
    if addrs.is_empty() {
        return Err(ClientError::NoAddressResolved);
    }

    let mut last_err = None;
    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ClientError::ConnectTimeout);
        }
        match connect_one(addr, remaining, cfg.socket_buf_size) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or(ClientError::NoAddressResolved))
}

fn connect_one(
    addr: SocketAddr,
    timeout: Duration,
    socket_buf_size: Option<usize>,
) -> Result<mio::net::TcpStream, ClientError> {
    let mut stream = mio::net::TcpStream::connect(addr)?;
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(1);
    poll.registry().register(&mut stream, CONNECT_TOKEN, Interest::WRITABLE)?;
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ClientError::ConnectTimeout);
        }
        match poll.poll(&mut events, Some(remaining)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
        if events.iter().any(|ev| ev.token() == CONNECT_TOKEN) {
            if let Some(err) = stream.take_error()? {
                return Err(err.into());
            }
            if let Some(size) = socket_buf_size {
                sparrow_net::socket::set_buf_size(&stream, size);
            }
            return Ok(stream);
        }
    }
}
