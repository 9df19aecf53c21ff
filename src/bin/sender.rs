//! Pulse Link Sender
//!
//! Imports or records a clip, finds the peripheral, and streams the audio
//! with its brightness track and motor directive.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulse_link::{
    audio::{import_wav, list_input_devices, CpalCapture, Microphone},
    config::AppConfig,
    error::AudioError,
    network::{MemoryTransport, Scanner, Transport, UdpBeaconDiscovery, UdpTransport},
    protocol::Reassembler,
    session::{Readiness, Sender, Session},
};

#[derive(Parser, Debug)]
#[command(name = "sender", about = "Stream audio, brightness and motor data to a peripheral")]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Encode and validate frames in memory instead of sending
    #[arg(long)]
    dry_run: bool,

    /// 8 kHz mono 16-bit WAV file to send
    #[arg(long, conflicts_with = "record", required_unless_present_any = ["record", "list_devices"])]
    wav: Option<PathBuf>,

    /// Record this many seconds from the microphone
    #[arg(long)]
    record: Option<u64>,

    /// Slow motor mode
    #[arg(long)]
    slow: bool,

    /// Peripheral address; scans for a beacon when omitted
    #[arg(long)]
    peripheral: Option<SocketAddr>,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,
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

    if args.list_devices {
        println!("\n=== Available Input Devices ===");
        for device in list_input_devices() {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            let native = if device.supports_native_format { "" } else { " (no 8 kHz mono)" };
            println!("  {}{}{}", device.name, default_marker, native);
            println!("    ID: {}", device.id);
        }
        return Ok(());
    }

    tracing::info!("Starting Pulse Link Sender");

    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_or_default()?,
    };

    let mut session = Session::new();
    let mut updates = session.subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().status.clone();
            tracing::debug!("Status: {}", status);
        }
    });

    // Acquire audio
    if let Some(path) = args.wav.clone() {
        session.begin_import()?;
        let result = tokio::task::spawn_blocking(move || import_wav(path))
            .await
            .context("import task failed")?
            .map_err(AudioError::from);
        session.finish_import(result)?;
    } else if let Some(secs) = args.record {
        let microphone = Microphone::new(CpalCapture::new(config.audio.input_device.as_deref()));
        session.begin_capture()?;

        match microphone.start() {
            Ok(recording) => {
                tracing::info!("Recording for {}s", secs);
                tokio::time::sleep(Duration::from_secs(secs)).await;
                let (_microphone, result) = recording.stop();
                session.finish_capture(result)?;
            }
            Err((_microphone, e)) => session.capture_failed(e)?,
        }
    }

    if session.readiness() != Readiness::Ready {
        bail!("{}", session.status_text());
    }

    let motor_fast = config.stream.motor_fast && !args.slow;
    session.set_motor(motor_fast)?;

    if args.dry_run {
        let transport = MemoryTransport::new().with_mtu(config.protocol.mtu);
        let mut sender = Sender::new(transport).with_extractor(config.audio.extractor());
        let report = sender.send(&mut session, motor_fast).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);

        // Check the frames the way a peripheral would
        let mut reassembler = Reassembler::new();
        for frame in sender.transport().frames() {
            if let Some(received) = reassembler.push(frame.as_bytes()) {
                println!("{}", serde_json::to_string_pretty(&received.summary())?);
            }
        }
        return Ok(());
    }

    let peer = match args.peripheral.or(config.transport.peripheral) {
        Some(addr) => addr,
        None => scan(&mut session, &config).await?,
    };

    let mut transport = UdpTransport::new(config.transport.bind_address, peer, config.protocol.mtu);
    session.begin_connect()?;
    let connected = transport.connect().await;
    session.on_connection_state(transport.connection_state());
    connected?;

    let mut sender = Sender::new(transport).with_extractor(config.audio.extractor());
    let result = sender.send(&mut session, motor_fast).await;

    session.begin_disconnect()?;
    sender.transport_mut().disconnect();
    session.on_connection_state(sender.transport().connection_state());

    let report = result?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    tracing::info!(
        "Sent {} frames to {} ({:.1} KB, {}ms), transport stats: {:?}",
        report.frames_sent,
        peer,
        report.bytes_sent as f64 / 1024.0,
        report.elapsed_ms,
        sender.transport().stats()
    );

    Ok(())
}

/// Listen for beacons and pick the first named peripheral. Ctrl+C ends the scan early.
async fn scan(session: &mut Session, config: &AppConfig) -> Result<SocketAddr> {
    session.begin_scan()?;

    let (cancel_tx, cancel_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(());
        }
    });

    let mut discovery = UdpBeaconDiscovery::new(SocketAddr::from(([0, 0, 0, 0], config.scan.beacon_port)));
    let outcome = Scanner::new(config.scan.timeout())
        .scan(&mut discovery, cancel_rx)
        .await;
    session.end_scan()?;

    let outcome = outcome?;
    for device in &outcome.devices {
        println!(
            "  {} at {}",
            device.name.as_deref().unwrap_or_default(),
            device.address
        );
    }

    match outcome.devices.first() {
        Some(device) => Ok(device.address),
        None if outcome.cancelled => bail!("scan cancelled"),
        None => bail!("no peripheral found within {:?}", config.scan.timeout()),
    }
}
