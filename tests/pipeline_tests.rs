// Integration tests for the sender pipeline
//
// Codec and fragmenter properties over arbitrary inputs, plus end-to-end
// runs from an imported WAV file through a session to a reassembled
// transmission on the peripheral side.

use anyhow::Result;
use proptest::prelude::*;

use pulse_link::{
    audio::{extract_track, import_wav, AudioBuffer, AudioOrigin},
    constants::{HEADER_SIZE, MAX_PAYLOAD_SIZE},
    error::ProtocolError,
    network::{ConnectionState, MemoryTransport, Transport, UdpTransport},
    protocol::{checksum, encode, parse, validate, LogicalMessage, PacketKind, Reassembler},
    session::{Readiness, Sender, Session},
    stream::build_stream_plan,
};

fn kind_strategy() -> impl Strategy<Value = PacketKind> {
    prop_oneof![
        Just(PacketKind::Audio),
        Just(PacketKind::Brightness),
        Just(PacketKind::Motor),
        Just(PacketKind::End),
    ]
}

proptest! {
    #[test]
    fn encoded_frames_validate(
        kind in kind_strategy(),
        seq in any::<u16>(),
        payload in prop::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD_SIZE),
    ) {
        let frame = encode(&LogicalMessage::new(kind, seq, payload.clone())).unwrap();
        let bytes = frame.as_bytes();

        prop_assert_eq!(bytes.len(), HEADER_SIZE + payload.len());
        prop_assert_eq!(bytes[0], kind.tag());
        prop_assert_eq!(u16::from_le_bytes([bytes[1], bytes[2]]), seq);
        prop_assert_eq!(bytes[3], checksum(bytes));
        prop_assert!(validate(bytes));

        let parsed = parse(bytes).unwrap();
        prop_assert_eq!(parsed.kind, kind);
        prop_assert_eq!(parsed.sequence_id, seq);
        prop_assert_eq!(parsed.payload, &payload[..]);
    }

    #[test]
    fn single_bit_flip_is_detected(
        payload in prop::collection::vec(any::<u8>(), 1..=MAX_PAYLOAD_SIZE),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let frame = encode(&LogicalMessage::new(PacketKind::Audio, 7, payload)).unwrap();
        let mut bytes = frame.as_bytes().to_vec();
        let i = index.index(bytes.len());
        bytes[i] ^= 1 << bit;
        prop_assert!(!validate(&bytes));
    }

    #[test]
    fn oversized_payload_is_rejected(extra in 1usize..64) {
        let len = MAX_PAYLOAD_SIZE + extra;
        let result = encode(&LogicalMessage::new(PacketKind::Audio, 0, vec![0u8; len]));
        prop_assert_eq!(
            result.unwrap_err(),
            ProtocolError::PayloadTooLarge { len, max: MAX_PAYLOAD_SIZE }
        );
    }

    #[test]
    fn plan_chunk_counts_and_sequences(
        audio_len in 0usize..4000,
        brightness_len in 0usize..400,
        motor_fast in any::<bool>(),
    ) {
        let plan = build_stream_plan(vec![0xAAu8; audio_len], vec![0x55u8; brightness_len], motor_fast).unwrap();

        prop_assert_eq!(plan.count(PacketKind::Audio), audio_len.div_ceil(MAX_PAYLOAD_SIZE));
        prop_assert_eq!(plan.count(PacketKind::Brightness), brightness_len.div_ceil(MAX_PAYLOAD_SIZE));
        prop_assert_eq!(plan.count(PacketKind::Motor), 1);
        prop_assert_eq!(plan.count(PacketKind::End), 1);

        for (i, message) in plan.iter().enumerate() {
            prop_assert_eq!(message.sequence_id as usize, i);
            prop_assert!(message.payload.len() <= MAX_PAYLOAD_SIZE);
        }

        let last = plan.messages().last().unwrap();
        prop_assert_eq!(last.kind, PacketKind::End);
        prop_assert!(last.payload.is_empty());
    }

    #[test]
    fn silence_gives_a_dark_track(len in 0usize..5000) {
        let track = extract_track(&vec![0i16; len], 800);
        prop_assert_eq!(track.len(), len.div_ceil(800));
        prop_assert!(track.iter().all(|&b| b == 0));
    }
}

fn write_wav(path: &std::path::Path, samples: &[i16]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

#[tokio::test]
async fn test_wav_to_reassembled_transmission() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("clip.wav");

    // One loud window, one silent, one half window at reference level
    let mut samples = vec![15000i16; 800];
    samples.extend(std::iter::repeat(0).take(800));
    samples.extend(std::iter::repeat(10000).take(400));
    write_wav(&path, &samples)?;

    let mut session = Session::new();
    session.begin_import()?;
    session.finish_import(import_wav(&path).map_err(Into::into))?;
    assert_eq!(session.readiness(), Readiness::Ready);

    let mut sender = Sender::new(MemoryTransport::new());
    let report = sender.send(&mut session, false).await?;

    let mut reassembler = Reassembler::new();
    let mut completed = Vec::new();
    for frame in sender.transport().frames() {
        assert!(frame.len() <= 180);
        if let Some(received) = reassembler.push(frame.as_bytes()) {
            completed.push(received);
        }
    }

    assert_eq!(completed.len(), 1);
    let received = &completed[0];
    assert_eq!(received.audio.len(), samples.len() * 2);
    assert_eq!(received.audio[..4], [0x98, 0x3A, 0x98, 0x3A]);
    assert_eq!(received.brightness, vec![255, 0, 170]);
    assert_eq!(received.motor_fast, Some(false));
    assert_eq!(received.frames, report.frames_sent);
    assert_eq!(reassembler.stats().frames_dropped, 0);

    Ok(())
}

#[tokio::test]
async fn test_repeat_send_restarts_sequence_ids() -> Result<()> {
    let mut session = Session::new();
    session.begin_import()?;
    session.finish_import(Ok(AudioBuffer::from_samples(&[500; 900], AudioOrigin::Import)))?;

    let mut sender = Sender::new(MemoryTransport::new());
    let first = sender.send(&mut session, true).await?;
    let second = sender.send(&mut session, true).await?;
    assert_eq!(first.frames_sent, second.frames_sent);

    let frames = sender.transport().frames();
    assert_eq!(frames[0].sequence_id(), 0);
    assert_eq!(frames[first.frames_sent].sequence_id(), 0);

    let mut reassembler = Reassembler::new();
    let count = frames
        .iter()
        .filter_map(|f| reassembler.push(f.as_bytes()))
        .count();
    assert_eq!(count, 2);
    assert_eq!(reassembler.stats().sequence_gaps, 0);

    Ok(())
}

#[tokio::test]
async fn test_udp_end_to_end() -> Result<()> {
    let peripheral = tokio::net::UdpSocket::bind("127.0.0.1:0").await?;
    let peer = peripheral.local_addr()?;

    let mut transport = UdpTransport::new("127.0.0.1:0".parse()?, peer, 180);
    transport.connect().await?;
    assert_eq!(transport.connection_state(), ConnectionState::Connected);

    let mut session = Session::new();
    session.begin_capture()?;
    session.finish_capture(Ok(AudioBuffer::from_samples(&[10000; 1000], AudioOrigin::Microphone)))?;

    let mut sender = Sender::new(transport);
    let report = sender.send(&mut session, true).await?;

    let mut reassembler = Reassembler::new();
    let mut buf = [0u8; 256];
    let received = loop {
        let n = peripheral.recv(&mut buf).await?;
        if let Some(received) = reassembler.push(&buf[..n]) {
            break received;
        }
    };

    assert_eq!(received.frames, report.frames_sent);
    assert_eq!(received.audio.len(), 2000);
    assert_eq!(received.brightness, vec![170, 170]);
    assert_eq!(received.motor_fast, Some(true));
    assert_eq!(session.status_text(), "Transmission Complete");

    Ok(())
}
