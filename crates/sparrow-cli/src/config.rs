use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use sparrow_client::ClientConfig;
use sparrow_server::ServerConfig;

/// On-disk `serde`+`toml` config file layered underneath CLI flags. Every
/// field is optional so a flag or a built-in default still wins when the
/// file omits it.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub is_ipv6: Option<bool>,
    pub worker_num: Option<usize>,
    pub idle_timeout_seconds: Option<u64>,
    pub max_connection_num: Option<usize>,
    pub connect_timeout_ms: Option<u64>,
    pub socket_buf_size: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

pub fn server_config(file: &FileConfig, ip: String, port: u16, worker_num: usize) -> ServerConfig {
    let mut cfg = ServerConfig::new(file.ip.clone().unwrap_or(ip), file.port.unwrap_or(port))
        .with_worker_num(file.worker_num.unwrap_or(worker_num));
    if let Some(secs) = file.idle_timeout_seconds {
        cfg = cfg.with_idle_timeout(Duration::from_secs(secs));
    }
    if let Some(max) = file.max_connection_num {
        cfg = cfg.with_max_connection_num(max);
    }
    if let Some(size) = file.socket_buf_size {
        cfg = cfg.with_socket_buf_size(size);
    }
    cfg.is_ipv6 = file.is_ipv6.unwrap_or(cfg.is_ipv6);
    cfg
}

pub fn client_config(file: &FileConfig, ip: String, port: u16) -> ClientConfig {
    let mut cfg = ClientConfig::new(file.ip.clone().unwrap_or(ip), file.port.unwrap_or(port));
    if let Some(ms) = file.connect_timeout_ms {
        cfg = cfg.with_connect_timeout(Duration::from_millis(ms));
    }
    if let Some(size) = file.socket_buf_size {
        cfg = cfg.with_socket_buf_size(size);
    }
    cfg.is_ipv6 = file.is_ipv6.unwrap_or(cfg.is_ipv6);
    cfg
}
