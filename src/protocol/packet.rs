//! Logical messages and their wire frames

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::checksum::{checksum, CHECKSUM_OFFSET};
use crate::constants::{HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::ProtocolError;

/// Message kind, carried in byte 0 of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketKind {
    /// Chunk of raw PCM16 audio
    Audio = 0x01,
    /// Chunk of the brightness track
    Brightness = 0x02,
    /// Single-byte motor directive
    Motor = 0x03,
    /// End of transmission, empty payload
    End = 0xFF,
}

impl PacketKind {
    /// Wire tag for this kind
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x01 => Ok(Self::Audio),
            0x02 => Ok(Self::Brightness),
            0x03 => Ok(Self::Motor),
            0xFF => Ok(Self::End),
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }
}

/// A unit of intent before encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalMessage {
    pub kind: PacketKind,
    pub sequence_id: u16,
    pub payload: Bytes,
}

impl LogicalMessage {
    pub fn new(kind: PacketKind, sequence_id: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            sequence_id,
            payload: payload.into(),
        }
    }

    /// Encode into a wire frame
    pub fn encode(&self) -> Result<Frame, ProtocolError> {
        encode(self)
    }
}

/// An encoded frame, ready for a single transport write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sequence_id(&self) -> u16 {
        u16::from_le_bytes([self.0[1], self.0[2]])
    }

    pub fn checksum(&self) -> u8 {
        self.0[CHECKSUM_OFFSET]
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Build the wire frame for `message`.
///
/// The checksum is computed last, over the fully populated buffer.
pub fn encode(message: &LogicalMessage) -> Result<Frame, ProtocolError> {
    let len = message.payload.len();
    if len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            len,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + len);
    buf.put_u8(message.kind.tag());
    buf.put_u16_le(message.sequence_id);
    buf.put_u8(0);
    buf.put_slice(&message.payload);

    buf[CHECKSUM_OFFSET] = checksum(&buf);

    Ok(Frame(buf.freeze()))
}

/// Receiver-side integrity check. Frames shorter than a header are invalid.
pub fn validate(frame: &[u8]) -> bool {
    frame.len() >= HEADER_SIZE && checksum(frame) == frame[CHECKSUM_OFFSET]
}

/// A frame decoded on the receiving side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedFrame<'a> {
    pub kind: PacketKind,
    pub sequence_id: u16,
    pub payload: &'a [u8],
}

/// Decode and verify a received frame
pub fn parse(frame: &[u8]) -> Result<ParsedFrame<'_>, ProtocolError> {
    if frame.len() < HEADER_SIZE {
        return Err(ProtocolError::FrameTooShort(frame.len()));
    }
    if frame.len() > HEADER_SIZE + MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            len: frame.len(),
            mtu: HEADER_SIZE + MAX_PAYLOAD_SIZE,
        });
    }

    let expected = checksum(frame);
    let actual = frame[CHECKSUM_OFFSET];
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }

    Ok(ParsedFrame {
        kind: PacketKind::try_from(frame[0])?,
        sequence_id: u16::from_le_bytes([frame[1], frame[2]]),
        payload: &frame[HEADER_SIZE..],
    })
}
