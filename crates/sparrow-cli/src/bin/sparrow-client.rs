use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use serde::{Deserialize, Serialize};
use sparrow_cli::{config, logging};
use sparrow_client::{Client, ClientConfig, ClientError};
use sparrow_protocol::Message;
use tracing::{error, info};

/// `<program> <thread-count> <ip> <port>`: each thread opens its own
/// connection and issues one synchronous echo call.
#[derive(Parser)]
struct Args {
    thread_count: usize,
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
    let client_cfg = config::client_config(&file, args.ip.clone(), args.port);

    let handles: Vec<_> = (0..args.thread_count.max(1))
        .map(|id| {
            let cfg = client_cfg.clone();
            thread::spawn(move || run_one(id as u64, &cfg))
        })
        .collect();

    for handle in handles {
        if let Err(e) = handle.join().expect("client thread panicked") {
            error!(error = %e, "client call failed");
        }
    }
    Ok(())
}

fn run_one(loginid: u64, cfg: &ClientConfig) -> Result<(), ClientError> {
    let mut client = Client::connect(cfg)?;
    let req = EchoReq { info: "hello".into(), loginid };
    let deadline = Instant::now() + Duration::from_secs(1);
    let rsp: EchoRsp = client.call_schema(&req, deadline)?;
    info!(loginid, info = %rsp.info, "echo call completed");
    Ok(())
}
