//! Immutable PCM audio buffers
//!
//! An `AudioBuffer` holds raw 16-bit little-endian mono PCM at 8kHz. It is
//! produced once by a capture or an import and never mutated afterwards;
//! the session replaces it wholesale when new audio arrives.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::constants::{BYTES_PER_SAMPLE, SAMPLE_RATE};
use crate::error::AudioError;

/// Where a buffer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioOrigin {
    Microphone,
    Import,
}

/// Raw PCM16 LE mono audio, cheap to clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    pcm: Bytes,
    origin: AudioOrigin,
}

impl AudioBuffer {
    /// Wrap raw PCM bytes. Odd lengths cannot hold whole samples and are rejected.
    pub fn new(pcm: impl Into<Bytes>, origin: AudioOrigin) -> Result<Self, AudioError> {
        let pcm = pcm.into();
        if pcm.len() % BYTES_PER_SAMPLE != 0 {
            return Err(AudioError::OddPcmLength(pcm.len()));
        }
        Ok(Self { pcm, origin })
    }

    pub fn from_samples(samples: &[i16], origin: AudioOrigin) -> Self {
        Self {
            pcm: Bytes::from(encode_pcm16_le(samples)),
            origin,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pcm
    }

    /// Shared handle to the underlying bytes
    pub fn bytes(&self) -> Bytes {
        self.pcm.clone()
    }

    pub fn origin(&self) -> AudioOrigin {
        self.origin
    }

    pub fn len_bytes(&self) -> usize {
        self.pcm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.pcm.len() / BYTES_PER_SAMPLE
    }

    pub fn duration_ms(&self) -> u64 {
        self.sample_count() as u64 * 1000 / SAMPLE_RATE as u64
    }

    /// Decoded samples
    pub fn samples(&self) -> Vec<i16> {
        decode_pcm16_le_truncating(&self.pcm)
    }
}

/// Reinterpret bytes as signed little-endian 16-bit samples.
///
/// An odd-length buffer is an error rather than a silently dropped byte.
pub fn decode_pcm16_le(bytes: &[u8]) -> Result<Vec<i16>, AudioError> {
    if bytes.len() % BYTES_PER_SAMPLE != 0 {
        return Err(AudioError::OddPcmLength(bytes.len()));
    }
    Ok(decode_pcm16_le_truncating(bytes))
}

/// Legacy conversion: a trailing odd byte is dropped without error.
pub fn decode_pcm16_le_truncating(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

pub fn encode_pcm16_le(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_little_endian() {
        let bytes = [0x10, 0x27, 0xF0, 0xD8, 0xFF, 0x7F, 0x00, 0x80];
        assert_eq!(
            decode_pcm16_le(&bytes).unwrap(),
            vec![10000, -10000, i16::MAX, i16::MIN]
        );
    }

    #[test]
    fn test_odd_length() {
        let bytes = [0x10, 0x27, 0x05];
        assert!(matches!(
            decode_pcm16_le(&bytes),
            Err(AudioError::OddPcmLength(3))
        ));
        assert_eq!(decode_pcm16_le_truncating(&bytes), vec![10000]);
        assert!(AudioBuffer::new(bytes.to_vec(), AudioOrigin::Import).is_err());
    }

    #[test]
    fn test_buffer_metrics() {
        let buffer = AudioBuffer::from_samples(&vec![0i16; 4000], AudioOrigin::Microphone);
        assert_eq!(buffer.len_bytes(), 8000);
        assert_eq!(buffer.sample_count(), 4000);
        assert_eq!(buffer.duration_ms(), 500);
        assert_eq!(buffer.origin(), AudioOrigin::Microphone);
        assert_eq!(buffer.samples().len(), 4000);
    }

    #[test]
    fn test_encode_matches_decode() {
        let samples = [1i16, -2, 300, -32768];
        assert_eq!(decode_pcm16_le(&encode_pcm16_le(&samples)).unwrap(), samples);
    }
}
