//! Stream plan construction

use bytes::Bytes;

use crate::constants::MAX_PAYLOAD_SIZE;
use crate::error::StreamError;
use crate::protocol::{LogicalMessage, PacketKind};

/// Number of distinct 16-bit sequence ids
const SEQUENCE_SPACE: usize = u16::MAX as usize + 1;

/// Ordered messages for one transmission: AUDIO*, BRIGHTNESS*, MOTOR, END
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPlan {
    messages: Vec<LogicalMessage>,
}

impl StreamPlan {
    pub fn messages(&self) -> &[LogicalMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<LogicalMessage> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogicalMessage> {
        self.messages.iter()
    }

    /// Messages of one kind
    pub fn count(&self, kind: PacketKind) -> usize {
        self.messages.iter().filter(|m| m.kind == kind).count()
    }

    /// Total bytes on the wire once encoded
    pub fn wire_size(&self) -> usize {
        self.messages
            .iter()
            .map(|m| crate::constants::HEADER_SIZE + m.payload.len())
            .sum()
    }
}

impl<'a> IntoIterator for &'a StreamPlan {
    type Item = &'a LogicalMessage;
    type IntoIter = std::slice::Iter<'a, LogicalMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

fn chunk_count(len: usize) -> usize {
    len.div_ceil(MAX_PAYLOAD_SIZE)
}

/// Zero-copy chunks of at most `MAX_PAYLOAD_SIZE` bytes
fn chunks(data: &Bytes) -> impl Iterator<Item = Bytes> + '_ {
    (0..data.len())
        .step_by(MAX_PAYLOAD_SIZE)
        .map(move |start| data.slice(start..(start + MAX_PAYLOAD_SIZE).min(data.len())))
}

/// Plan a transmission.
///
/// Audio chunks come first, then brightness chunks, then exactly one MOTOR
/// and one END message. Sequence ids run 0, 1, 2, ... with no gaps. Empty
/// inputs simply contribute no chunks.
pub fn build_stream_plan(
    audio: impl Into<Bytes>,
    brightness: impl Into<Bytes>,
    motor_fast: bool,
) -> Result<StreamPlan, StreamError> {
    let audio = audio.into();
    let brightness = brightness.into();

    let total = chunk_count(audio.len()) + chunk_count(brightness.len()) + 2;
    if total > SEQUENCE_SPACE {
        return Err(StreamError::PlanTooLong(total));
    }

    let payloads = chunks(&audio)
        .map(|chunk| (PacketKind::Audio, chunk))
        .chain(chunks(&brightness).map(|chunk| (PacketKind::Brightness, chunk)))
        .chain(std::iter::once((
            PacketKind::Motor,
            Bytes::from_static(if motor_fast { &[0x01] } else { &[0x00] }),
        )))
        .chain(std::iter::once((PacketKind::End, Bytes::new())));

    let messages: Vec<LogicalMessage> = payloads
        .enumerate()
        .map(|(seq, (kind, payload))| {
            debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE);
            // total <= SEQUENCE_SPACE, so every index fits in u16
            LogicalMessage::new(kind, seq as u16, payload)
        })
        .collect();

    debug_assert_eq!(messages.len(), total);

    Ok(StreamPlan { messages })
}
