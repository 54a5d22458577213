use std::time::Duration;

/// Configuration recognized by the server: bind address (`ip`, `port`,
/// `is_ipv6`), worker process count, idle eviction timeout, and the
/// per-worker connection ceiling.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ip: String,
    pub port: u16,
    pub is_ipv6: bool,
    pub worker_num: usize,
    pub idle_timeout: Duration,
    pub max_connection_num: usize,
    pub socket_buf_size: Option<usize>,
}

impl ServerConfig {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            is_ipv6: false,
            worker_num: 1,
            idle_timeout: Duration::from_secs(60),
            max_connection_num: sparrow_poller::MAX_FD,
            socket_buf_size: None,
        }
    }

    pub fn with_worker_num(mut self, worker_num: usize) -> Self {
        self.worker_num = worker_num.max(1);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_max_connection_num(mut self, max: usize) -> Self {
        self.max_connection_num = max.min(sparrow_poller::MAX_FD);
        self
    }

    /// Sets `SO_SNDBUF`/`SO_RCVBUF` on every socket this worker accepts.
    pub fn with_socket_buf_size(mut self, size: usize) -> Self {
        self.socket_buf_size = Some(size);
        self
    }

    pub fn socket_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        let ip: std::net::IpAddr = self
            .ip
            .parse()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid ip address"))?;
        Ok(std::net::SocketAddr::new(ip, self.port))
    }
}
