//! # Pulse Link
//!
//! Streams a recorded or imported audio clip, a derived per-window
//! brightness track and a motor directive to an embedded peripheral over a
//! packet-size-constrained wireless link.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               SENDER                                  │
//! │  ┌──────────────┐     ┌──────────────┐                                │
//! │  │  Microphone  │     │  WAV import  │   audio::{capture, import}     │
//! │  └──────┬───────┘     └──────┬───────┘                                │
//! │         └─────────┬──────────┘                                        │
//! │                   ▼                                                   │
//! │           AudioBuffer (PCM16 LE, 8kHz mono)                           │
//! │                   │                                                   │
//! │        ┌──────────┴───────────┐                                       │
//! │        │                      ▼                                       │
//! │        │        Amplitude extractor (audio::amplitude)                │
//! │        │          800-sample windows → RMS → 0..255                   │
//! │        ▼                      ▼                                       │
//! │  ┌────────────────────────────────────────────────────────────────┐  │
//! │  │          Stream plan (stream::plan) - one sequence counter       │  │
//! │  │   AUDIO × n │ BRIGHTNESS × m │ MOTOR │ END                       │  │
//! │  └────────────────────────────────────────────────────────────────┘  │
//! │                   │                                                   │
//! │                   ▼                                                   │
//! │  ┌────────────────────────────────────────────────────────────────┐  │
//! │  │  Packet codec (protocol) [kind|seq lo|seq hi|xor|payload ≤176]   │  │
//! │  └────────────────────────────────────────────────────────────────┘  │
//! │                   │  strictly in order, one write at a time           │
//! │                   ▼                                                   │
//! │        Transport (network) ── gated by Session (session)              │
//! └───────────────────┼──────────────────────────────────────────────────┘
//!                     │ ≤ 180-byte frames, no acknowledgment
//!                     ▼
//! ┌───────────────────┼──────────────────────────────────────────────────┐
//! │               PERIPHERAL: validate checksum, reassemble until END     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;
pub mod stream;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Fixed sample rate of every audio buffer in the pipeline
    pub const SAMPLE_RATE: u32 = 8000;

    /// Bytes per PCM sample (16-bit)
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Brightness window duration in milliseconds
    pub const WINDOW_MS: u32 = 100;

    /// Brightness window size in samples (100ms at 8kHz)
    pub const WINDOW_SIZE: usize = 800;

    /// RMS value mapped to full brightness; fixed by the peripheral firmware
    pub const BRIGHTNESS_SCALE: f64 = 15000.0;

    /// Negotiated transport payload limit per write
    pub const MAX_FRAME_SIZE: usize = 180;

    /// Frame header: kind, sequence low, sequence high, checksum
    pub const HEADER_SIZE: usize = 4;

    /// Largest payload one frame can carry
    pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - HEADER_SIZE;

    /// Default scan duration in seconds
    pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 10;

    /// Default UDP port the peripheral listens on
    pub const DEFAULT_PERIPHERAL_PORT: u16 = 5000;

    /// Default UDP port peripherals announce themselves on
    pub const DEFAULT_BEACON_PORT: u16 = 5001;
}
