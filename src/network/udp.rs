//! Datagram link to a peripheral
//!
//! One frame per datagram. The socket is built with socket2 so buffer sizes
//! can be tuned, then handed to tokio.

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use tracing::{debug, info, warn};

use super::transport::{ConnectionState, Transport};
use crate::error::TransportError;
use crate::protocol::Frame;

/// Socket send/receive buffer size
const SOCKET_BUFFER_SIZE: usize = 64 * 1024;

/// Create a non-blocking UDP socket bound to `bind_addr`
pub fn create_socket(bind_addr: SocketAddr) -> io::Result<std::net::UdpSocket> {
    let domain = if bind_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_send_buffer_size(SOCKET_BUFFER_SIZE)?;
    socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE)?;
    socket.set_nonblocking(true)?;
    socket.bind(&bind_addr.into())?;

    Ok(socket.into())
}

/// Transport statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
}

/// UDP transport to a single peripheral
pub struct UdpTransport {
    bind_addr: SocketAddr,
    peer: SocketAddr,
    mtu: usize,
    socket: Option<tokio::net::UdpSocket>,
    state: ConnectionState,
    stats: TransportStats,
}

impl UdpTransport {
    pub fn new(bind_addr: SocketAddr, peer: SocketAddr, mtu: usize) -> Self {
        Self {
            bind_addr,
            peer,
            mtu,
            socket: None,
            state: ConnectionState::Disconnected,
            stats: TransportStats::default(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Open the socket and associate it with the peripheral
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        info!("Connecting to peripheral at {}", self.peer);

        match self.open().await {
            Ok(socket) => {
                self.socket = Some(socket);
                self.state = ConnectionState::Connected;
                info!("Connected to {} (MTU {})", self.peer, self.mtu);
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                warn!("Connection to {} failed: {}", self.peer, e);
                Err(TransportError::ConnectionFailed(e.to_string()))
            }
        }
    }

    async fn open(&self) -> io::Result<tokio::net::UdpSocket> {
        let socket = tokio::net::UdpSocket::from_std(create_socket(self.bind_addr)?)?;
        socket.connect(self.peer).await?;
        Ok(socket)
    }

    pub fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            info!("Disconnected from {}", self.peer);
        }
        self.state = ConnectionState::Disconnected;
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    fn is_link_loss(err: &io::Error) -> bool {
        matches!(
            err.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::NotConnected
        )
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn write(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let socket = match (&self.socket, self.state) {
            (Some(socket), ConnectionState::Connected) => socket,
            _ => return Err(TransportError::NotConnected),
        };

        if frame.len() > self.mtu {
            return Err(TransportError::FrameExceedsMtu {
                len: frame.len(),
                mtu: self.mtu,
            });
        }

        match socket.send(frame.as_bytes()).await {
            Ok(n) if n == frame.len() => {
                self.stats.frames_sent += 1;
                self.stats.bytes_sent += n as u64;
                debug!("Sent frame seq={} ({} bytes)", frame.sequence_id(), n);
                Ok(())
            }
            Ok(n) => {
                self.stats.send_errors += 1;
                Err(TransportError::SendFailed(format!(
                    "short write: {} of {} bytes",
                    n,
                    frame.len()
                )))
            }
            Err(e) => {
                self.stats.send_errors += 1;
                if Self::is_link_loss(&e) {
                    warn!("Link to {} lost: {}", self.peer, e);
                    self.disconnect();
                }
                Err(TransportError::Io(e))
            }
        }
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }
}
