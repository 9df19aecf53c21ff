//! Pulse Link Receiver
//!
//! Emulates a peripheral: announces itself with a beacon, validates and
//! reassembles incoming frames, and logs each completed transmission.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulse_link::{constants::*, network::create_socket, protocol::Reassembler};

#[derive(Parser, Debug)]
#[command(name = "receiver", about = "Peripheral emulator for the frame protocol")]
struct Args {
    /// Address to receive frames on
    #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PERIPHERAL_PORT)))]
    bind: SocketAddr,

    /// Name announced in beacons
    #[arg(long, default_value = "ESP32_AUDIO_MTR")]
    name: String,

    /// Port beacons are broadcast to
    #[arg(long, default_value_t = DEFAULT_BEACON_PORT)]
    beacon_port: u16,

    /// Beacon period in milliseconds; 0 disables beacons
    #[arg(long, default_value_t = 1000)]
    beacon_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!("Starting Pulse Link Receiver on {}", args.bind);

    let std_socket = create_socket(args.bind).with_context(|| format!("bind {}", args.bind))?;
    std_socket.set_broadcast(true)?;
    let socket = tokio::net::UdpSocket::from_std(std_socket)?;

    let beacon_target = SocketAddr::from(([255, 255, 255, 255], args.beacon_port));
    let beacons_enabled = args.beacon_interval_ms > 0;
    let mut beacon = tokio::time::interval(Duration::from_millis(args.beacon_interval_ms.max(1)));

    let mut reassembler = Reassembler::new();
    // Room for a frame larger than the MTU, so oversize frames are seen and dropped
    let mut buf = [0u8; 2048];

    tracing::info!("Waiting for frames - press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = beacon.tick(), if beacons_enabled => {
                if let Err(e) = socket.send_to(args.name.as_bytes(), beacon_target).await {
                    tracing::warn!("Beacon send failed: {}", e);
                }
            }
            res = socket.recv_from(&mut buf) => {
                let (n, from) = match res {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Receive failed: {}", e);
                        continue;
                    }
                };
                tracing::trace!("{} bytes from {}", n, from);

                if let Some(received) = reassembler.push(&buf[..n]) {
                    let summary = received.summary();
                    tracing::info!(
                        "Transmission from {}: {}",
                        from,
                        serde_json::to_string(&summary)?
                    );
                }
            }
        }
    }

    tracing::info!(
        "Shutting down, stats: {}",
        serde_json::to_string(reassembler.stats())?
    );
    Ok(())
}
