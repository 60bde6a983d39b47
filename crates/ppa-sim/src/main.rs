//! Simulated DSP speaker for end-to-end testing without hardware.
//!
//! Binds the device port, answers discovery/liveness pings with a
//! configurable unique id, and applies volume and preset-recall commands
//! to in-memory state (visible in the logs).

mod device;

use std::net::{Ipv4Addr, SocketAddrV4};

use clap::Parser;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{info, warn};

use ppa_protocol::DEFAULT_DEVICE_PORT;

use crate::device::SimulatedDevice;

#[derive(Parser, Debug)]
#[command(name = "ppa-sim", about = "Simulated PPA DSP device")]
struct Args {
    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_DEVICE_PORT)]
    port: u16,

    /// Device name used in log output
    #[arg(long, default_value = "Simulated Speaker")]
    name: String,

    /// 4-byte device fingerprint as 8 hex digits
    #[arg(long, default_value = "00010203", value_parser = parse_unique_id)]
    unique_id: [u8; 4],

    /// Component id reported in ping replies
    #[arg(long, default_value_t = 1)]
    component_id: u8,
}

fn parse_unique_id(s: &str) -> Result<[u8; 4], String> {
    let s = s.trim_start_matches("0x");
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("expected 8 hex digits, e.g. 00010203".to_string());
    }
    let mut id = [0u8; 4];
    for (i, byte) in id.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|e| e.to_string())?;
    }
    Ok(id)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let socket = {
        let s = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        s.set_reuse_address(true)?;
        s.set_broadcast(true)?;
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, args.port);
        s.bind(&addr.into())?;
        s.set_nonblocking(true)?;
        UdpSocket::from_std(s.into())?
    };

    info!(
        port = args.port,
        name = %args.name,
        id = ?args.unique_id,
        "simulated device listening"
    );

    let mut device = SimulatedDevice::new(args.name, args.unique_id, args.component_id);
    let mut buf = [0u8; 1024];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("receive failed: {e}");
                continue;
            }
        };

        if let Some(reply) = device.handle_frame(&buf[..len]) {
            if let Err(e) = socket.send_to(&reply, src).await {
                warn!(to = %src, "failed to send reply: {e}");
            }
        }
    }
}
