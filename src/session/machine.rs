//! Session state machine
//!
//! Three independent axes (transport, capture, readiness) plus transient
//! scanning, importing and streaming flags. Every user action is checked
//! against the current state before it is allowed to run; every transition
//! publishes a fresh [`SessionSnapshot`].

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::state::{
    Action, CaptureState, Readiness, SessionSnapshot, Status, StreamingState,
};
use crate::audio::AudioBuffer;
use crate::error::{AudioError, CaptureError, SessionError, StreamError};
use crate::network::ConnectionState;
use crate::stream::StreamReport;

/// Proof that a transmission was admitted.
///
/// Holds the audio and motor directive captured at admission time. Only
/// one exists per session at a time; hand it back with
/// [`Session::finish_send`].
#[derive(Debug)]
pub struct StreamPermit {
    session_id: Uuid,
    audio: AudioBuffer,
    motor_fast: bool,
}

impl StreamPermit {
    pub fn audio(&self) -> &AudioBuffer {
        &self.audio
    }

    pub fn motor_fast(&self) -> bool {
        self.motor_fast
    }
}

/// Sender-side session
pub struct Session {
    id: Uuid,
    connection: ConnectionState,
    scanning: bool,
    capture: CaptureState,
    readiness: Readiness,
    streaming: StreamingState,
    importing: bool,
    motor_fast: bool,
    audio: Option<AudioBuffer>,
    /// Audio held back while a capture starts; restored if the device fails
    displaced: Option<AudioBuffer>,
    status: Status,
    updates: watch::Sender<SessionSnapshot>,
}

impl Session {
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        let placeholder = SessionSnapshot {
            session_id: id,
            timestamp: Utc::now(),
            connection: ConnectionState::Disconnected,
            scanning: false,
            capture: CaptureState::Idle,
            readiness: Readiness::NotReady,
            streaming: StreamingState::Idle,
            importing: false,
            motor_fast: true,
            audio_duration_ms: None,
            status: Status::Idle.to_string(),
            permitted: Vec::new(),
        };
        let (updates, _) = watch::channel(placeholder);

        let session = Self {
            id,
            connection: ConnectionState::Disconnected,
            scanning: false,
            capture: CaptureState::Idle,
            readiness: Readiness::NotReady,
            streaming: StreamingState::Idle,
            importing: false,
            motor_fast: true,
            audio: None,
            displaced: None,
            status: Status::Idle,
            updates,
        };
        session.publish();

        info!("Session {} created", id);
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn capture(&self) -> CaptureState {
        self.capture
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn streaming(&self) -> StreamingState {
        self.streaming
    }

    pub fn is_importing(&self) -> bool {
        self.importing
    }

    pub fn motor_fast(&self) -> bool {
        self.motor_fast
    }

    pub fn audio(&self) -> Option<&AudioBuffer> {
        self.audio.as_ref()
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn status_text(&self) -> String {
        self.status.to_string()
    }

    /// Receive a snapshot after every transition
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            timestamp: Utc::now(),
            connection: self.connection,
            scanning: self.scanning,
            capture: self.capture,
            readiness: self.readiness,
            streaming: self.streaming,
            importing: self.importing,
            motor_fast: self.motor_fast,
            audio_duration_ms: self.audio.as_ref().map(AudioBuffer::duration_ms),
            status: self.status.to_string(),
            permitted: self.permitted_actions(),
        }
    }

    fn publish(&self) {
        // No receivers is fine: the value is kept for later subscribers
        self.updates.send_replace(self.snapshot());
    }

    fn transition(&mut self, status: Status) {
        debug!("Session {}: {}", self.id, status);
        self.status = status;
        self.publish();
    }

    /// Check whether `action` is permitted right now
    pub fn check(&self, action: Action) -> Result<(), SessionError> {
        let recording = self.capture == CaptureState::Recording;
        let streaming = self.streaming.is_in_progress();

        let refusal = match action {
            Action::Scan => {
                if self.connection != ConnectionState::Disconnected {
                    Some("transport is not disconnected")
                } else if self.scanning {
                    Some("scan already in progress")
                } else if recording {
                    Some("recording in progress")
                } else if streaming {
                    Some("transmission in progress")
                } else {
                    None
                }
            }
            Action::StopScan => (!self.scanning).then_some("no scan in progress"),
            Action::Connect => {
                if self.connection != ConnectionState::Disconnected {
                    Some("transport is not disconnected")
                } else if streaming {
                    Some("transmission in progress")
                } else {
                    None
                }
            }
            Action::Disconnect => {
                if self.connection == ConnectionState::Disconnected {
                    Some("not connected")
                } else if streaming {
                    Some("transmission in progress")
                } else {
                    None
                }
            }
            Action::StartRecording => {
                if recording {
                    Some("already recording")
                } else if streaming {
                    Some("transmission in progress")
                } else if self.importing {
                    Some("import in progress")
                } else {
                    None
                }
            }
            Action::StopRecording => (!recording).then_some("not recording"),
            Action::PickFile => {
                if recording {
                    Some("recording in progress")
                } else if streaming {
                    Some("transmission in progress")
                } else if self.importing {
                    Some("import in progress")
                } else {
                    None
                }
            }
            Action::Send => {
                if self.connection != ConnectionState::Connected {
                    Some("not connected")
                } else if self.readiness != Readiness::Ready {
                    Some("no audio ready")
                } else if recording {
                    Some("recording in progress")
                } else if streaming {
                    Some("transmission in progress")
                } else if self.importing {
                    Some("import in progress")
                } else {
                    None
                }
            }
            Action::SetMotor => streaming.then_some("transmission in progress"),
        };

        match refusal {
            Some(reason) => Err(SessionError::ActionNotPermitted { action, reason }),
            None => Ok(()),
        }
    }

    pub fn can(&self, action: Action) -> bool {
        self.check(action).is_ok()
    }

    pub fn permitted_actions(&self) -> Vec<Action> {
        Action::ALL.into_iter().filter(|a| self.can(*a)).collect()
    }

    /// Follow the transport's connection state
    pub fn on_connection_state(&mut self, state: ConnectionState) {
        if state == self.connection {
            return;
        }

        info!("Transport: {:?} -> {:?}", self.connection, state);
        self.connection = state;

        // Connecting ends any scan in progress
        if state != ConnectionState::Disconnected {
            self.scanning = false;
        }

        self.transition(match state {
            ConnectionState::Disconnected => Status::Disconnected,
            ConnectionState::Connecting => Status::Connecting,
            ConnectionState::Connected => Status::Connected,
        });
    }

    /// Admit a connection attempt and move to `Connecting`
    pub fn begin_connect(&mut self) -> Result<(), SessionError> {
        self.check(Action::Connect)?;
        self.on_connection_state(ConnectionState::Connecting);
        Ok(())
    }

    /// Admit a disconnect; the transport reports the resulting state
    pub fn begin_disconnect(&mut self) -> Result<(), SessionError> {
        self.check(Action::Disconnect)
    }

    pub fn begin_scan(&mut self) -> Result<(), SessionError> {
        self.check(Action::Scan)?;
        self.scanning = true;
        self.transition(Status::Scanning);
        Ok(())
    }

    /// Scan ended by timeout or cancel
    pub fn end_scan(&mut self) -> Result<(), SessionError> {
        self.check(Action::StopScan)?;
        self.scanning = false;
        self.transition(Status::ScanFinished);
        Ok(())
    }

    pub fn set_motor(&mut self, fast: bool) -> Result<(), SessionError> {
        self.check(Action::SetMotor)?;
        self.motor_fast = fast;
        info!("Motor mode: {}", if fast { "fast" } else { "slow" });
        self.publish();
        Ok(())
    }

    /// Start a capture. Previous audio is withdrawn until the device
    /// either fails to start ([`Session::capture_failed`]) or the capture
    /// completes.
    pub fn begin_capture(&mut self) -> Result<(), SessionError> {
        self.check(Action::StartRecording)?;
        self.capture = CaptureState::Recording;
        self.readiness = Readiness::NotReady;
        self.displaced = self.audio.take();
        self.transition(Status::RecordingMic);
        Ok(())
    }

    /// The device never started; previous audio and readiness come back
    pub fn capture_failed(&mut self, error: CaptureError) -> Result<(), SessionError> {
        self.check(Action::StopRecording)?;
        self.capture = CaptureState::Idle;

        if let Some(audio) = self.displaced.take() {
            self.audio = Some(audio);
            self.readiness = Readiness::Ready;
        }

        warn!("Capture did not start: {}", error);
        self.transition(Status::Error(error.to_string()));
        Ok(())
    }

    /// Record the result of stopping a capture
    pub fn finish_capture(
        &mut self,
        result: Result<AudioBuffer, AudioError>,
    ) -> Result<(), SessionError> {
        self.check(Action::StopRecording)?;
        self.capture = CaptureState::Idle;
        self.displaced = None;

        match result {
            Ok(audio) => {
                info!("Captured {} ms of audio", audio.duration_ms());
                self.audio = Some(audio);
                self.readiness = Readiness::Ready;
                self.transition(Status::MicRecordingReady);
            }
            Err(e) => {
                warn!("Capture failed: {}", e);
                self.transition(Status::Error(e.to_string()));
            }
        }
        Ok(())
    }

    pub fn begin_import(&mut self) -> Result<(), SessionError> {
        self.check(Action::PickFile)?;
        self.importing = true;
        self.transition(Status::ConvertingFile);
        Ok(())
    }

    /// Record the result of an import; a failed import keeps the previous audio
    pub fn finish_import(
        &mut self,
        result: Result<AudioBuffer, AudioError>,
    ) -> Result<(), SessionError> {
        if !self.importing {
            return Err(SessionError::ActionNotPermitted {
                action: Action::PickFile,
                reason: "no import in progress",
            });
        }
        self.importing = false;

        match result {
            Ok(audio) => {
                info!("Imported {} ms of audio", audio.duration_ms());
                self.audio = Some(audio);
                self.readiness = Readiness::Ready;
                self.transition(Status::AudioReady);
            }
            Err(e) => {
                warn!("Import failed: {}", e);
                self.transition(Status::Error(e.to_string()));
            }
        }
        Ok(())
    }

    /// Admit a transmission
    pub fn begin_send(&mut self, motor_fast: bool) -> Result<StreamPermit, SessionError> {
        self.check(Action::Send)?;
        let audio = self.audio.clone().ok_or(SessionError::NoAudio)?;

        self.motor_fast = motor_fast;
        self.streaming = StreamingState::InProgress { next_sequence: 0 };
        self.transition(Status::StreamingData);

        Ok(StreamPermit {
            session_id: self.id,
            audio,
            motor_fast,
        })
    }

    /// Note that the frame with `sequence_id` has been written
    pub fn advance_stream(&mut self, sequence_id: u16) {
        if let StreamingState::InProgress { next_sequence } = &mut self.streaming {
            *next_sequence = u32::from(sequence_id) + 1;
            self.publish();
        }
    }

    /// End a transmission admitted by [`Session::begin_send`]
    pub fn finish_send(
        &mut self,
        permit: StreamPermit,
        outcome: &Result<StreamReport, StreamError>,
    ) {
        debug_assert_eq!(permit.session_id, self.id);
        self.streaming = StreamingState::Idle;

        match outcome {
            Ok(report) => {
                info!(
                    "Transmission complete: {} frames in {}ms",
                    report.frames_sent, report.elapsed_ms
                );
                self.transition(Status::TransmissionComplete);
            }
            Err(e) => {
                warn!("Transmission failed: {}", e);
                self.transition(Status::Error(e.to_string()));
            }
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioOrigin, MemoryCapture, Microphone};
    use crate::error::{CaptureError, TransportError};

    fn audio() -> AudioBuffer {
        AudioBuffer::from_samples(&[100; 1600], AudioOrigin::Microphone)
    }

    fn ready_session() -> Session {
        let mut session = Session::new();
        session.on_connection_state(ConnectionState::Connected);
        session.begin_capture().unwrap();
        session.finish_capture(Ok(audio())).unwrap();
        session
    }

    #[test]
    fn test_initial_state() {
        let session = Session::new();
        assert_eq!(session.connection(), ConnectionState::Disconnected);
        assert_eq!(session.readiness(), Readiness::NotReady);
        assert_eq!(session.status_text(), "Idle");
        assert!(!session.can(Action::Send));
        assert!(session.can(Action::Scan));
        assert!(session.can(Action::Connect));
        assert!(!session.can(Action::Disconnect));
    }

    #[test]
    fn test_send_requires_every_condition() {
        let session = ready_session();
        assert!(session.can(Action::Send));

        let mut s = ready_session();
        s.on_connection_state(ConnectionState::Connecting);
        assert!(!s.can(Action::Send));

        let mut s = Session::new();
        s.on_connection_state(ConnectionState::Connected);
        assert!(matches!(
            s.check(Action::Send),
            Err(SessionError::ActionNotPermitted { action: Action::Send, reason: "no audio ready" })
        ));

        let mut s = ready_session();
        s.begin_import().unwrap();
        assert!(!s.can(Action::Send));
    }

    #[test]
    fn test_new_capture_resets_readiness() {
        let mut session = ready_session();
        session.begin_capture().unwrap();

        assert_eq!(session.readiness(), Readiness::NotReady);
        assert!(session.audio().is_none());
        assert!(!session.can(Action::Send));
        assert!(!session.can(Action::PickFile));
        assert_eq!(session.status_text(), "Recording Mic...");
    }

    #[test]
    fn test_device_start_failure_keeps_ready_audio() {
        let mut session = ready_session();
        let microphone = Microphone::new(MemoryCapture::failing(|| CaptureError::PermissionDenied));

        session.begin_capture().unwrap();
        let (_microphone, error) = microphone.start().err().unwrap();
        session.capture_failed(error).unwrap();

        assert_eq!(session.capture(), CaptureState::Idle);
        assert_eq!(session.readiness(), Readiness::Ready);
        assert_eq!(session.audio().unwrap().sample_count(), 1600);
        assert!(session.can(Action::Send));
        assert!(session.status_text().starts_with("Error: "));
    }

    #[test]
    fn test_device_start_failure_without_audio_stays_not_ready() {
        let mut session = Session::new();
        session.begin_capture().unwrap();
        session.capture_failed(CaptureError::PermissionDenied).unwrap();

        assert_eq!(session.readiness(), Readiness::NotReady);
        assert!(session.audio().is_none());
        assert!(session.capture_failed(CaptureError::PermissionDenied).is_err());
    }

    #[test]
    fn test_failed_stop_discards_previous_audio() {
        let mut session = ready_session();
        session.begin_capture().unwrap();
        session
            .finish_capture(Err(AudioError::Capture(CaptureError::PermissionDenied)))
            .unwrap();

        assert_eq!(session.capture(), CaptureState::Idle);
        assert_eq!(session.readiness(), Readiness::NotReady);
        assert!(session.audio().is_none());
        assert!(session.status_text().starts_with("Error: "));
    }

    #[test]
    fn test_stop_without_recording_is_refused() {
        let mut session = Session::new();
        assert!(session.finish_capture(Ok(audio())).is_err());
    }

    #[test]
    fn test_one_stream_at_a_time() {
        let mut session = ready_session();
        let permit = session.begin_send(false).unwrap();
        assert!(permit.audio().sample_count() > 0);
        assert!(!permit.motor_fast());

        assert!(matches!(
            session.begin_send(true),
            Err(SessionError::ActionNotPermitted { action: Action::Send, .. })
        ));
        assert!(!session.can(Action::Disconnect));
        assert!(!session.can(Action::StartRecording));
        assert!(!session.can(Action::SetMotor));
        assert_eq!(session.status_text(), "Streaming Data...");

        session.advance_stream(4);
        assert_eq!(
            session.streaming(),
            StreamingState::InProgress { next_sequence: 5 }
        );

        let report = StreamReport {
            frames_sent: 5,
            ..Default::default()
        };
        session.finish_send(permit, &Ok(report));

        assert_eq!(session.streaming(), StreamingState::Idle);
        assert_eq!(session.status_text(), "Transmission Complete");
        // Audio is kept, so the same clip can be sent again
        assert!(session.can(Action::Send));
    }

    #[test]
    fn test_failed_send_returns_to_idle() {
        let mut session = ready_session();
        let permit = session.begin_send(true).unwrap();
        let failure = Err(StreamError::TransportFailure {
            sequence_id: 2,
            source: TransportError::NotConnected,
        });
        session.finish_send(permit, &failure);

        assert!(!session.streaming().is_in_progress());
        assert!(session.status_text().starts_with("Error: "));
    }

    #[test]
    fn test_scan_lifecycle() {
        let mut session = Session::new();
        session.begin_scan().unwrap();
        assert!(session.is_scanning());
        assert!(!session.can(Action::Scan));
        assert!(session.can(Action::StopScan));

        session.end_scan().unwrap();
        assert!(!session.is_scanning());
        assert!(session.can(Action::Scan));
        assert!(matches!(
            session.end_scan(),
            Err(SessionError::ActionNotPermitted { action: Action::StopScan, .. })
        ));
    }

    #[test]
    fn test_connect_and_disconnect_are_guarded() {
        let mut session = Session::new();
        assert!(session.begin_disconnect().is_err());

        session.begin_scan().unwrap();
        session.begin_connect().unwrap();
        assert_eq!(session.connection(), ConnectionState::Connecting);
        assert!(!session.is_scanning());
        assert!(matches!(
            session.begin_connect(),
            Err(SessionError::ActionNotPermitted { action: Action::Connect, .. })
        ));

        let mut session = ready_session();
        assert!(session.begin_connect().is_err());
        let permit = session.begin_send(true).unwrap();
        assert!(matches!(
            session.begin_disconnect(),
            Err(SessionError::ActionNotPermitted { action: Action::Disconnect, reason: "transmission in progress" })
        ));
        session.finish_send(permit, &Ok(StreamReport::default()));
        assert!(session.begin_disconnect().is_ok());
    }

    #[test]
    fn test_connecting_stops_scan() {
        let mut session = Session::new();
        session.begin_scan().unwrap();
        session.on_connection_state(ConnectionState::Connecting);

        assert!(!session.is_scanning());
        assert_eq!(session.status_text(), "Connecting...");
        assert!(!session.can(Action::Scan));
        assert!(!session.can(Action::Connect));
    }

    #[test]
    fn test_import_flow() {
        let mut session = Session::new();
        session.begin_import().unwrap();
        assert!(session.is_importing());
        assert!(!session.can(Action::PickFile));
        assert!(!session.can(Action::StartRecording));
        assert_eq!(session.status_text(), "Converting file...");

        session
            .finish_import(Ok(AudioBuffer::from_samples(&[1; 8], AudioOrigin::Import)))
            .unwrap();
        assert!(!session.is_importing());
        assert_eq!(session.readiness(), Readiness::Ready);
        assert_eq!(session.status_text(), "Audio Ready");
    }

    #[test]
    fn test_import_result_without_import_is_refused() {
        let mut session = Session::new();
        let result =
            session.finish_import(Ok(AudioBuffer::from_samples(&[1; 8], AudioOrigin::Import)));

        assert!(matches!(
            result,
            Err(SessionError::ActionNotPermitted { action: Action::PickFile, reason: "no import in progress" })
        ));
        assert_eq!(session.readiness(), Readiness::NotReady);
        assert!(session.audio().is_none());
        assert_eq!(session.status_text(), "Idle");
    }

    #[test]
    fn test_snapshots_are_published() {
        let mut session = Session::new();
        let mut rx = session.subscribe();
        assert_eq!(rx.borrow_and_update().status, "Idle");

        session.on_connection_state(ConnectionState::Connected);
        assert!(rx.has_changed().unwrap());

        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.session_id, session.id());
        assert_eq!(snapshot.connection, ConnectionState::Connected);
        assert_eq!(snapshot.status, "Connected");
        assert!(snapshot.permitted.contains(&Action::Disconnect));
        assert!(!snapshot.permitted.contains(&Action::Send));
    }
}
