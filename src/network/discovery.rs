//! Peripheral discovery
//!
//! Scanning is time-bounded and cancellable. Whatever ends the scan
//! (timeout, cancel, or an error while collecting), the underlying
//! discovery is stopped before `Scanner::scan` returns.

use async_trait::async_trait;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::udp::create_socket;
use crate::constants::DEFAULT_SCAN_TIMEOUT_SECS;
use crate::error::TransportError;

/// A peripheral seen during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    /// Advertised name; anonymous advertisements are ignored by the scanner
    pub name: Option<String>,
    pub address: SocketAddr,
}

/// A discovery mechanism that reports devices into a channel
#[async_trait]
pub trait Discovery: Send {
    /// Begin reporting devices into `found`
    async fn start(&mut self, found: mpsc::Sender<DiscoveredDevice>) -> Result<(), TransportError>;

    /// Stop reporting. Must not return until discovery has ceased.
    async fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// Result of a scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanOutcome {
    /// Named devices, first sighting order, unique by address
    pub devices: Vec<DiscoveredDevice>,
    /// Whether the scan was stopped early
    pub cancelled: bool,
}

/// Runs a discovery for a bounded time
#[derive(Debug, Clone, Copy)]
pub struct Scanner {
    timeout: Duration,
}

impl Scanner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Scan until the timeout elapses or `cancel` fires
    pub async fn scan<D: Discovery + ?Sized>(
        &self,
        discovery: &mut D,
        mut cancel: oneshot::Receiver<()>,
    ) -> Result<ScanOutcome, TransportError> {
        let (found_tx, mut found_rx) = mpsc::channel(64);
        discovery.start(found_tx).await?;
        info!("Scanning for peripherals ({:?})", self.timeout);

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let mut outcome = ScanOutcome::default();
        let mut cancel_armed = true;

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                res = &mut cancel, if cancel_armed => {
                    if res.is_ok() {
                        outcome.cancelled = true;
                        break;
                    }
                    // Cancel handle dropped without firing: run to the timeout
                    cancel_armed = false;
                }
                Some(device) = found_rx.recv() => Self::record(&mut outcome.devices, device),
            }
        }

        discovery.stop().await;

        info!(
            "Scan finished: {} device(s){}",
            outcome.devices.len(),
            if outcome.cancelled { " (cancelled)" } else { "" }
        );

        Ok(outcome)
    }

    fn record(devices: &mut Vec<DiscoveredDevice>, device: DiscoveredDevice) {
        if device.name.is_none() {
            debug!("Ignoring anonymous device at {}", device.address);
            return;
        }
        if devices.iter().any(|d| d.address == device.address) {
            return;
        }

        info!(
            "Found device: {} ({})",
            device.name.as_deref().unwrap_or_default(),
            device.address
        );
        devices.push(device);
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_SCAN_TIMEOUT_SECS))
    }
}

/// Listens for peripheral beacons: one datagram carrying the UTF-8 device name
pub struct UdpBeaconDiscovery {
    bind_addr: SocketAddr,
    task: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl UdpBeaconDiscovery {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            task: None,
        }
    }

    fn parse_beacon(payload: &[u8], from: SocketAddr) -> DiscoveredDevice {
        let name = std::str::from_utf8(payload)
            .ok()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        DiscoveredDevice {
            name,
            address: from,
        }
    }
}

#[async_trait]
impl Discovery for UdpBeaconDiscovery {
    async fn start(&mut self, found: mpsc::Sender<DiscoveredDevice>) -> Result<(), TransportError> {
        if self.task.is_some() {
            return Ok(());
        }

        let std_socket = create_socket(self.bind_addr)
            .map_err(|e| TransportError::Discovery(format!("bind {}: {}", self.bind_addr, e)))?;
        let socket = tokio::net::UdpSocket::from_std(std_socket)?;

        let (stop_tx, mut stop_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    res = socket.recv_from(&mut buf) => match res {
                        Ok((n, from)) => {
                            let device = UdpBeaconDiscovery::parse_beacon(&buf[..n], from);
                            if found.send(device).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Beacon receive failed: {}", e);
                            break;
                        }
                    },
                }
            }
            // Socket dropped here
        });

        self.task = Some((stop_tx, handle));
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some((stop_tx, handle)) = self.task.take() {
            let _ = stop_tx.send(());
            if let Err(e) = handle.await {
                warn!("Beacon listener panicked: {}", e);
            }
        }
    }

    fn is_active(&self) -> bool {
        self.task.is_some()
    }
}
