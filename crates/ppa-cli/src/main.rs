use std::net::Ipv4Addr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;

use ppa_protocol::{DEFAULT_DEVICE_PORT, DEFAULT_DEVICE_TIMEOUT_MS, DEFAULT_DISCOVERY_INTERVAL_MS};
use ppa_session::{DeviceKey, Session, SessionConfig, SessionEvent};

#[derive(Parser, Debug)]
#[command(name = "ppa", about = "PPA DSP device control CLI")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Device/discovery port
    #[arg(long, default_value_t = DEFAULT_DEVICE_PORT, global = true)]
    port: u16,

    /// Broadcast address for discovery
    #[arg(long, default_value_t = Ipv4Addr::BROADCAST, global = true)]
    broadcast: Ipv4Addr,

    /// Discovery broadcast interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_DISCOVERY_INTERVAL_MS, global = true)]
    interval_ms: u64,

    /// Device liveness timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_DEVICE_TIMEOUT_MS, global = true)]
    device_timeout_ms: u64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Broadcast discovery pings and print devices as they appear
    Discover {
        /// How long to keep discovering, in seconds
        #[arg(short, long, default_value = "30")]
        timeout_secs: u64,
    },
    /// Ping a device and wait for its answer
    Ping {
        /// Device address as host or host:port
        target: DeviceKey,
    },
    /// Set a device's master volume
    Volume {
        /// Device address as host or host:port
        target: DeviceKey,
        /// Normalized volume, 0.0 (−80dB) to 1.0 (+20dB)
        level: f32,
    },
    /// Recall a stored preset by index
    Recall {
        /// Device address as host or host:port
        target: DeviceKey,
        /// Preset number
        preset: u8,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let config = SessionConfig {
        discovery_port: args.port,
        discovery_interval_ms: args.interval_ms,
        device_timeout_ms: args.device_timeout_ms,
        broadcast_address: args.broadcast,
    };

    let (events_tx, events_rx) = mpsc::channel(64);
    let mut session = Session::new(config, events_tx);
    session.start().await?;

    let result = match args.command {
        Commands::Discover { timeout_secs } => {
            discover(events_rx, Duration::from_secs(timeout_secs)).await
        }
        Commands::Ping { target } => {
            session.add_device(target.host.clone(), target.port);
            await_response(events_rx, &target, "pong").await
        }
        Commands::Volume { target, level } => {
            session.add_device(target.host.clone(), target.port);
            session.send_volume(target.clone(), level);
            println!("volume {:.0}% sent to {}", level.clamp(0.0, 1.0) * 100.0, target);
            await_response(events_rx, &target, "acknowledged").await
        }
        Commands::Recall { target, preset } => {
            session.add_device(target.host.clone(), target.port);
            session.send_preset_recall(target.clone(), preset);
            println!("preset {preset} recall sent to {target}");
            await_response(events_rx, &target, "acknowledged").await
        }
    };

    session.stop().await;
    result
}

async fn discover(
    mut events: mpsc::Receiver<SessionEvent>,
    window: Duration,
) -> anyhow::Result<()> {
    println!("Discovering devices for {}s...", window.as_secs());

    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        let Ok(Some(event)) = timeout(remaining, events.recv()).await else {
            break;
        };
        match event {
            SessionEvent::DeviceDiscovered(device) => {
                println!(
                    "  + {} ({}) id={:02x?}",
                    device.key, device.name, device.unique_id
                );
            }
            SessionEvent::DeviceTimedOut(device) => {
                println!("  - {} timed out", device.key);
            }
            SessionEvent::Error(message) => eprintln!("  ! {message}"),
            SessionEvent::MessageReceived { header, source } => {
                debug!(?header, %source, "message received");
            }
        }
    }

    Ok(())
}

/// Wait briefly for any message back from the target. Devices don't
/// acknowledge fire-and-forget commands, so silence is not a failure —
/// it is reported as such.
async fn await_response(
    mut events: mpsc::Receiver<SessionEvent>,
    target: &DeviceKey,
    verdict: &str,
) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            println!("{target}: no response (fire-and-forget, command may still have landed)");
            return Ok(());
        }
        let Ok(Some(event)) = timeout(remaining, events.recv()).await else {
            println!("{target}: no response (fire-and-forget, command may still have landed)");
            return Ok(());
        };
        match event {
            SessionEvent::MessageReceived { header, source }
                if DeviceKey::from_addr(source) == *target =>
            {
                println!(
                    "{target}: {verdict} (seq {}, id {:02x?})",
                    header.sequence_number, header.device_unique_id
                );
                return Ok(());
            }
            SessionEvent::Error(message) => {
                anyhow::bail!("session error: {message}");
            }
            other => debug!(?other, "ignoring event"),
        }
    }
}
