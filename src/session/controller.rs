//! Drives one transmission end to end

use tracing::info;

use super::machine::Session;
use crate::audio::AmplitudeExtractor;
use crate::error::{Error, StreamError};
use crate::network::Transport;
use crate::stream::{build_stream_plan, execute_with_progress, StreamReport};

/// Sends the session's audio over a transport
pub struct Sender<T: Transport> {
    transport: T,
    extractor: AmplitudeExtractor,
}

impl<T: Transport> Sender<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            extractor: AmplitudeExtractor::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: AmplitudeExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Stream the session's current audio with its brightness track and
    /// motor directive. The session is back to idle streaming when this
    /// returns, whatever the outcome.
    pub async fn send(&mut self, session: &mut Session, motor_fast: bool) -> Result<StreamReport, Error> {
        session.on_connection_state(self.transport.connection_state());
        let permit = session.begin_send(motor_fast)?;

        let track = self.extractor.extract(permit.audio());
        info!(
            "Sending {} bytes of audio, {} brightness values, motor {}",
            permit.audio().len_bytes(),
            track.len(),
            if permit.motor_fast() { "fast" } else { "slow" }
        );

        let outcome: Result<StreamReport, StreamError> =
            match build_stream_plan(permit.audio().bytes(), track, permit.motor_fast()) {
                Ok(plan) => {
                    execute_with_progress(&plan, &mut self.transport, |seq| {
                        session.advance_stream(seq)
                    })
                    .await
                }
                Err(e) => Err(e),
            };

        // A write failure may have been link loss
        session.on_connection_state(self.transport.connection_state());
        session.finish_send(permit, &outcome);

        outcome.map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioBuffer, AudioOrigin};
    use crate::error::{SessionError, TransportError};
    use crate::network::{ConnectionState, MemoryTransport};
    use crate::protocol::{PacketKind, Reassembler};
    use crate::session::{Action, StreamingState};

    fn session_with(samples: &[i16]) -> Session {
        let mut session = Session::new();
        session.begin_import().unwrap();
        session
            .finish_import(Ok(AudioBuffer::from_samples(samples, AudioOrigin::Import)))
            .unwrap();
        session
    }

    #[tokio::test]
    async fn test_send_delivers_full_transmission() {
        let mut session = session_with(&[15000; 1600]);
        let mut sender = Sender::new(MemoryTransport::new());

        let report = sender.send(&mut session, true).await.unwrap();

        // 3200 bytes audio -> 19 chunks, 2 brightness bytes -> 1, MOTOR, END
        assert_eq!(report.frames_sent, 22);
        assert_eq!(report.last_sequence, Some(21));
        assert_eq!(session.streaming(), StreamingState::Idle);
        assert_eq!(session.connection(), ConnectionState::Connected);
        assert_eq!(session.status_text(), "Transmission Complete");

        let mut reassembler = Reassembler::new();
        let received = sender
            .transport()
            .frames()
            .iter()
            .find_map(|f| reassembler.push(f.as_bytes()))
            .unwrap();
        assert_eq!(received.audio.len(), 3200);
        assert_eq!(received.brightness, vec![255, 255]);
        assert_eq!(received.motor_fast, Some(true));
        assert_eq!(received.gaps, 0);
    }

    #[tokio::test]
    async fn test_send_refused_when_disconnected() {
        let mut session = session_with(&[1; 8]);
        let mut transport = MemoryTransport::new();
        transport.set_state(ConnectionState::Disconnected);
        let mut sender = Sender::new(transport);

        let err = sender.send(&mut session, true).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::ActionNotPermitted { action: Action::Send, .. })
        ));
        assert_eq!(sender.transport().writes_attempted(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_sequence() {
        let mut session = session_with(&[1; 8]);
        let mut sender = Sender::new(MemoryTransport::new().fail_on_write(2));

        let err = sender.send(&mut session, false).await.unwrap_err();
        match err {
            Error::Stream(StreamError::TransportFailure { sequence_id, source }) => {
                assert_eq!(sequence_id, 1);
                assert!(matches!(source, TransportError::SendFailed(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!session.streaming().is_in_progress());
        assert!(session.status_text().starts_with("Error: "));
        // Failure leaves the audio in place for a retry
        assert!(session.can(Action::Send));
    }

    #[tokio::test]
    async fn test_empty_audio_still_sends_motor_and_end() {
        let mut session = session_with(&[]);
        let mut sender = Sender::new(MemoryTransport::new());

        let report = sender.send(&mut session, false).await.unwrap();
        assert_eq!(report.frames_sent, 2);

        let kinds: Vec<u8> = sender
            .transport()
            .frames()
            .iter()
            .map(|f| f.as_bytes()[0])
            .collect();
        assert_eq!(kinds, vec![PacketKind::Motor.tag(), PacketKind::End.tag()]);
    }
}
