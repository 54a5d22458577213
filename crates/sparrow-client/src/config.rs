use std::time::Duration;

/// Configuration recognized by the client: target address (`ip`, `port`,
/// `is_ipv6`), connect timeout, and whether to hand the connection off to
/// the background async read-loop.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ip: String,
    pub port: u16,
    pub is_ipv6: bool,
    pub connect_timeout: Duration,
    pub is_async: bool,
    pub socket_buf_size: Option<usize>,
}

impl ClientConfig {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            is_ipv6: false,
            connect_timeout: Duration::from_secs(3),
            is_async: false,
            socket_buf_size: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    /// Sets `SO_SNDBUF`/`SO_RCVBUF` on the outbound socket this client dials.
    pub fn with_socket_buf_size(mut self, size: usize) -> Self {
        self.socket_buf_size = Some(size);
        self
    }
}
