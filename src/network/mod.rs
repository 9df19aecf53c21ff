//! Transport subsystem: the link to the peripheral

pub mod discovery;
pub mod transport;
pub mod udp;

pub use discovery::{DiscoveredDevice, Discovery, ScanOutcome, Scanner, UdpBeaconDiscovery};
pub use transport::{ConnectionState, MemoryTransport, Transport};
pub use udp::{create_socket, UdpTransport};
