use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use sparrow_cli::{config, logging};
use sparrow_protocol::{Message, ProtocolRegistry, SchemaProtocol};
use tracing::info;

/// `<program> <worker-count> <ip> <port>`, with an optional config file
/// layered underneath.
#[derive(Parser)]
struct Args {
    worker_count: usize,
    ip: String,
    port: u16,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Default, Serialize, Deserialize)]
struct EchoReq {
    info: String,
    loginid: u64,
}
impl Message for EchoReq {
    const URI: u32 = 0x11;
}

#[derive(Default, Serialize, Deserialize)]
struct EchoRsp {
    info: String,
    loginid: u64,
}
impl Message for EchoRsp {
    const URI: u32 = 0x12;
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    let args = Args::parse();
    let file = match &args.config {
        Some(path) => config::FileConfig::load(path)?,
        None => config::FileConfig::default(),
    };
    let server_cfg = config::server_config(&file, args.ip, args.port, args.worker_count);

    let mut schema = SchemaProtocol::new();
    schema.register_handler::<EchoReq, EchoRsp, _>(|req, rsp| {
        rsp.info = req.info.clone();
        rsp.loginid = req.loginid;
    })?;

    let mut registry = ProtocolRegistry::new();
    registry.install(Box::new(schema));

    info!(worker_num = server_cfg.worker_num, "starting server");
    sparrow_server::run(server_cfg, registry)?;
    Ok(())
}
