//! Receiver-side reassembly
//!
//! Mirrors what the peripheral does with incoming frames: drop anything
//! that fails validation, append AUDIO and BRIGHTNESS payloads in arrival
//! order, remember the motor directive and hand back the whole
//! transmission once END arrives. Nothing is ever re-requested.

use serde::Serialize;
use tracing::{debug, warn};

use super::packet::{parse, PacketKind};

/// One complete transmission, terminated by END
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceivedTransmission {
    /// Concatenated AUDIO payloads (PCM16 LE)
    pub audio: Vec<u8>,
    /// Concatenated BRIGHTNESS payloads
    pub brightness: Vec<u8>,
    /// Motor directive, if a MOTOR frame arrived
    pub motor_fast: Option<bool>,
    /// Frames accepted for this transmission, END included
    pub frames: usize,
    /// Sequence discontinuities seen
    pub gaps: usize,
}

impl ReceivedTransmission {
    pub fn summary(&self) -> TransmissionSummary {
        TransmissionSummary {
            audio_bytes: self.audio.len(),
            brightness_windows: self.brightness.len(),
            motor_fast: self.motor_fast,
            frames: self.frames,
            gaps: self.gaps,
        }
    }
}

/// Loggable view of a transmission
#[derive(Debug, Clone, Serialize)]
pub struct TransmissionSummary {
    pub audio_bytes: usize,
    pub brightness_windows: usize,
    pub motor_fast: Option<bool>,
    pub frames: usize,
    pub gaps: usize,
}

/// Lifetime counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReassemblyStats {
    pub frames_accepted: u64,
    pub frames_dropped: u64,
    pub sequence_gaps: u64,
    pub transmissions: u64,
}

#[derive(Default)]
pub struct Reassembler {
    current: ReceivedTransmission,
    next_sequence: Option<u16>,
    stats: ReassemblyStats,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw frame. Returns the finished transmission on END.
    pub fn push(&mut self, frame: &[u8]) -> Option<ReceivedTransmission> {
        let parsed = match parse(frame) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Dropping frame ({} bytes): {}", frame.len(), e);
                self.stats.frames_dropped += 1;
                return None;
            }
        };

        // Sequence 0 in the middle of a transmission means the sender started over
        if parsed.sequence_id == 0 && self.current.frames > 0 {
            warn!(
                "Sender restarted after {} frames, discarding partial transmission",
                self.current.frames
            );
            self.current = ReceivedTransmission::default();
            self.next_sequence = None;
        }

        if let Some(expected) = self.next_sequence {
            if parsed.sequence_id != expected {
                debug!("Sequence gap: expected {}, got {}", expected, parsed.sequence_id);
                self.current.gaps += 1;
                self.stats.sequence_gaps += 1;
            }
        }
        self.next_sequence = Some(parsed.sequence_id.wrapping_add(1));
        self.current.frames += 1;
        self.stats.frames_accepted += 1;

        match parsed.kind {
            PacketKind::Audio => self.current.audio.extend_from_slice(parsed.payload),
            PacketKind::Brightness => self.current.brightness.extend_from_slice(parsed.payload),
            PacketKind::Motor => {
                self.current.motor_fast = parsed.payload.first().map(|&b| b != 0);
            }
            PacketKind::End => {
                self.next_sequence = None;
                self.stats.transmissions += 1;
                return Some(std::mem::take(&mut self.current));
            }
        }

        None
    }

    /// Frames buffered for the transmission in progress
    pub fn pending_frames(&self) -> usize {
        self.current.frames
    }

    pub fn stats(&self) -> &ReassemblyStats {
        &self.stats
    }

    /// Discard any partial transmission (e.g. after a receive timeout)
    pub fn reset(&mut self) {
        self.current = ReceivedTransmission::default();
        self.next_sequence = None;
    }
}
