//! Session axes, user actions and the published snapshot

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::network::ConnectionState;

/// Microphone capture axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CaptureState {
    #[default]
    Idle,
    Recording,
}

/// Whether an audio buffer is available to send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Readiness {
    #[default]
    NotReady,
    Ready,
}

/// Transmission progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum StreamingState {
    #[default]
    Idle,
    /// `next_sequence` is the id of the next frame to be written
    InProgress { next_sequence: u32 },
}

impl StreamingState {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, StreamingState::InProgress { .. })
    }
}

/// Something the user can ask the session to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    Scan,
    StopScan,
    Connect,
    Disconnect,
    StartRecording,
    StopRecording,
    PickFile,
    Send,
    SetMotor,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::Scan,
        Action::StopScan,
        Action::Connect,
        Action::Disconnect,
        Action::StartRecording,
        Action::StopRecording,
        Action::PickFile,
        Action::Send,
        Action::SetMotor,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Scan => write!(f, "scan"),
            Action::StopScan => write!(f, "stop scan"),
            Action::Connect => write!(f, "connect"),
            Action::Disconnect => write!(f, "disconnect"),
            Action::StartRecording => write!(f, "start recording"),
            Action::StopRecording => write!(f, "stop recording"),
            Action::PickFile => write!(f, "pick file"),
            Action::Send => write!(f, "send"),
            Action::SetMotor => write!(f, "set motor"),
        }
    }
}

/// Human-readable status line, set by the most recent transition
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    Scanning,
    ScanFinished,
    Connecting,
    Connected,
    Disconnected,
    RecordingMic,
    MicRecordingReady,
    ConvertingFile,
    AudioReady,
    StreamingData,
    TransmissionComplete,
    Error(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => write!(f, "Idle"),
            Status::Scanning => write!(f, "Scanning..."),
            Status::ScanFinished => write!(f, "Scan finished"),
            Status::Connecting => write!(f, "Connecting..."),
            Status::Connected => write!(f, "Connected"),
            Status::Disconnected => write!(f, "Disconnected"),
            Status::RecordingMic => write!(f, "Recording Mic..."),
            Status::MicRecordingReady => write!(f, "Mic Recording Ready"),
            Status::ConvertingFile => write!(f, "Converting file..."),
            Status::AudioReady => write!(f, "Audio Ready"),
            Status::StreamingData => write!(f, "Streaming Data..."),
            Status::TransmissionComplete => write!(f, "Transmission Complete"),
            Status::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Point-in-time view of a session, published after every transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub connection: ConnectionState,
    pub scanning: bool,
    pub capture: CaptureState,
    pub readiness: Readiness,
    pub streaming: StreamingState,
    pub importing: bool,
    pub motor_fast: bool,
    pub audio_duration_ms: Option<u64>,
    pub status: String,
    pub permitted: Vec<Action>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(Status::RecordingMic.to_string(), "Recording Mic...");
        assert_eq!(Status::TransmissionComplete.to_string(), "Transmission Complete");
        assert_eq!(
            Status::Error("device lost".into()).to_string(),
            "Error: device lost"
        );
    }

    #[test]
    fn test_action_list_is_complete() {
        let unique: std::collections::HashSet<_> = Action::ALL.iter().collect();
        assert_eq!(unique.len(), Action::ALL.len());
        assert_eq!(Action::StartRecording.to_string(), "start recording");
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = SessionSnapshot {
            session_id: Uuid::nil(),
            timestamp: Utc::now(),
            connection: ConnectionState::Connected,
            scanning: false,
            capture: CaptureState::Idle,
            readiness: Readiness::Ready,
            streaming: StreamingState::InProgress { next_sequence: 3 },
            importing: false,
            motor_fast: true,
            audio_duration_ms: Some(1000),
            status: "Streaming Data...".into(),
            permitted: vec![Action::SetMotor],
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["connection"], "Connected");
        assert_eq!(json["streaming"]["InProgress"]["next_sequence"], 3);
        assert_eq!(json["permitted"][0], "SetMotor");
    }
}
