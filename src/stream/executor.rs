//! Sequential plan execution
//!
//! Frames are written strictly in plan order and each write is awaited
//! before the next is issued. The first failed write aborts the run;
//! frames already sent stay sent, and the peripheral is left to time out
//! the incomplete transmission.

use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info};

use super::plan::StreamPlan;
use crate::error::StreamError;
use crate::network::Transport;

/// Outcome of a completed transmission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamReport {
    pub frames_sent: usize,
    pub bytes_sent: usize,
    pub last_sequence: Option<u16>,
    pub elapsed_ms: u64,
}

/// Encode and write every message of `plan`, in order
pub async fn execute<T: Transport + ?Sized>(
    plan: &StreamPlan,
    transport: &mut T,
) -> Result<StreamReport, StreamError> {
    execute_with_progress(plan, transport, |_| {}).await
}

/// Like [`execute`], calling `on_sent` with each sequence id once its write completes
pub async fn execute_with_progress<T, F>(
    plan: &StreamPlan,
    transport: &mut T,
    mut on_sent: F,
) -> Result<StreamReport, StreamError>
where
    T: Transport + ?Sized,
    F: FnMut(u16),
{
    let started = Instant::now();
    let mut report = StreamReport::default();

    info!("Streaming {} frames ({} bytes)", plan.len(), plan.wire_size());

    for message in plan {
        let frame = message.encode()?;

        if let Err(source) = transport.write(&frame).await {
            error!(
                "Write failed at sequence {} after {} frames: {}",
                message.sequence_id, report.frames_sent, source
            );
            return Err(StreamError::TransportFailure {
                sequence_id: message.sequence_id,
                source,
            });
        }

        debug!(
            "Sent {:?} seq={} ({} bytes)",
            message.kind,
            message.sequence_id,
            frame.len()
        );

        report.frames_sent += 1;
        report.bytes_sent += frame.len();
        report.last_sequence = Some(message.sequence_id);
        on_sent(message.sequence_id);
    }

    report.elapsed_ms = started.elapsed().as_millis() as u64;

    info!(
        "Transmission complete: {} frames, {:.1} KB in {}ms",
        report.frames_sent,
        report.bytes_sent as f64 / 1024.0,
        report.elapsed_ms
    );

    Ok(report)
}
