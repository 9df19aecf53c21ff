//! Peripheral wire protocol
//!
//! Every frame is a 4-byte header followed by at most 176 payload bytes:
//!
//! ```text
//! ┌────────┬──────────┬──────────┬──────────┬─────────────────┐
//! │ Byte 0 │ Byte 1   │ Byte 2   │ Byte 3   │ Byte 4..N       │
//! │ Kind   │ Seq low  │ Seq high │ Checksum │ Payload (≤176B) │
//! └────────┴──────────┴──────────┴──────────┴─────────────────┘
//! ```
//!
//! The checksum is the XOR of every byte except byte 3.

pub mod checksum;
pub mod packet;
pub mod reassembly;

pub use checksum::checksum;
pub use packet::{encode, parse, validate, Frame, LogicalMessage, PacketKind, ParsedFrame};
pub use reassembly::{Reassembler, ReassemblyStats, ReceivedTransmission};
