//! The write-frame primitive consumed by the streamer

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::constants::MAX_FRAME_SIZE;
use crate::error::TransportError;
use crate::protocol::Frame;

/// Link state as observed by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// A link that accepts one frame per write.
///
/// Writes are fire-and-forget: a successful return means the frame was
/// handed to the link, not that the peripheral received it. Callers await
/// each write before issuing the next.
#[async_trait]
pub trait Transport: Send {
    /// Hand one frame to the link
    async fn write(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// Largest frame a single write accepts
    fn mtu(&self) -> usize;

    fn connection_state(&self) -> ConnectionState;
}

/// In-process transport that records every frame.
///
/// Used for dry runs and tests; can be told to fail on the n-th write.
#[derive(Debug)]
pub struct MemoryTransport {
    frames: Vec<Frame>,
    mtu: usize,
    state: ConnectionState,
    fail_on_write: Option<usize>,
    writes_attempted: usize,
}

impl MemoryTransport {
    /// A connected transport with the reference MTU
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            mtu: MAX_FRAME_SIZE,
            state: ConnectionState::Connected,
            fail_on_write: None,
            writes_attempted: 0,
        }
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Fail the n-th write (1-based)
    pub fn fail_on_write(mut self, n: usize) -> Self {
        self.fail_on_write = Some(n);
        self
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Frames successfully written, in order
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn writes_attempted(&self) -> usize {
        self.writes_attempted
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.writes_attempted = 0;
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn write(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.writes_attempted += 1;

        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        if frame.len() > self.mtu {
            return Err(TransportError::FrameExceedsMtu {
                len: frame.len(),
                mtu: self.mtu,
            });
        }
        if self.fail_on_write == Some(self.writes_attempted) {
            return Err(TransportError::SendFailed(format!(
                "injected failure on write {}",
                self.writes_attempted
            )));
        }

        self.frames.push(frame.clone());
        Ok(())
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }
}
