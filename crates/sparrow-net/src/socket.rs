use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

/// Opens a listening socket with `SO_REUSEADDR`+`SO_REUSEPORT` set before
/// `bind`, so every pre-forked worker can own an independent listener on
/// the same address and let the kernel load-balance `accept`s between
/// them. Mirrors the raw-syscall style the rest of this crate uses for
/// socket options the standard library doesn't expose.
pub fn listen_reuseport(addr: SocketAddr, backlog: i32) -> io::Result<mio::net::TcpListener> {
    let domain = if addr.is_ipv4() { libc::AF_INET } else { libc::AF_INET6 };
    let fd = unsafe { libc::socket(domain, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    if let Err(e) = set_reuseaddr_reuseport(fd) {
        unsafe { libc::close(fd) };
        return Err(e);
    }

    let (sockaddr, len) = to_sockaddr(addr);
    let bind_rc = unsafe { libc::bind(fd, sockaddr.as_ptr().cast(), len) };
    if bind_rc != 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    let listen_rc = unsafe { libc::listen(fd, backlog) };
    if listen_rc != 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    set_nonblocking(fd)?;

    let std_listener = unsafe { std::net::TcpListener::from_raw_fd(fd) };
    mio::net::TcpListener::from_std(std_listener).map_err(|e| {
        unsafe { libc::close(fd) };
        e
    })
}

fn set_reuseaddr_reuseport(fd: RawFd) -> io::Result<()> {
    let one: libc::c_int = 1;
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            std::ptr::addr_of!(one).cast(),
            size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // best-effort: not every platform supports SO_REUSEPORT.
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEPORT,
            std::ptr::addr_of!(one).cast(),
            size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    Ok(())
}

pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Sets kernel `SO_SNDBUF` and `SO_RCVBUF` on `stream`. Applied the same way
/// to outbound (client-dialed) and accepted (server-side) sockets.
pub fn set_buf_size(stream: &impl AsRawFd, size: usize) {
    let size = size as libc::c_int;
    let fd = stream.as_raw_fd();
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            std::ptr::addr_of!(size).cast(),
            size_of::<libc::c_int>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            std::ptr::addr_of!(size).cast(),
            size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

fn to_sockaddr(addr: SocketAddr) -> (Vec<u8>, libc::socklen_t) {
    match addr {
        SocketAddr::V4(v4) => {
            let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
            sa.sin_family = libc::AF_INET as libc::sa_family_t;
            sa.sin_port = v4.port().to_be();
            sa.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            let bytes = unsafe {
                std::slice::from_raw_parts(
                    std::ptr::addr_of!(sa).cast::<u8>(),
                    size_of::<libc::sockaddr_in>(),
                )
            }
            .to_vec();
            (bytes, size_of::<libc::sockaddr_in>() as libc::socklen_t)
        }
        SocketAddr::V6(v6) => {
            let mut sa: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
            sa.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sa.sin6_port = v6.port().to_be();
            sa.sin6_addr.s6_addr = v6.ip().octets();
            let bytes = unsafe {
                std::slice::from_raw_parts(
                    std::ptr::addr_of!(sa).cast::<u8>(),
                    size_of::<libc::sockaddr_in6>(),
                )
            }
            .to_vec();
            (bytes, size_of::<libc::sockaddr_in6>() as libc::socklen_t)
        }
    }
}
