//! Error types for the peripheral streaming pipeline

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire format errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("Frame of {len} bytes exceeds MTU {mtu}")]
    FrameTooLarge { len: usize, mtu: usize },

    #[error("Unknown packet kind: 0x{0:02X}")]
    UnknownKind(u8),

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Link-level errors raised by a transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Frame of {len} bytes exceeds negotiated MTU {mtu}")]
    FrameExceedsMtu { len: usize, mtu: usize },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while executing a stream plan
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Transport failure at sequence {sequence_id}: {source}")]
    TransportFailure {
        sequence_id: u16,
        #[source]
        source: TransportError,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Plan of {0} messages exceeds the 16-bit sequence space")]
    PlanTooLong(usize),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("PCM buffer has odd length: {0} bytes")]
    OddPcmLength(usize),
}

/// Microphone capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Capture device already released")]
    AlreadyReleased,
}

/// Audio import errors
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Unsupported format: {sample_rate}Hz, {channels} channels, {bits} bits (expected 8000Hz mono 16-bit)")]
    UnsupportedFormat {
        sample_rate: u32,
        channels: u16,
        bits: u16,
    },
}

/// Session guard violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("{action} not permitted: {reason}")]
    ActionNotPermitted {
        action: crate::session::Action,
        reason: &'static str,
    },

    #[error("No audio available")]
    NoAudio,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
