//! Microphone capture
//!
//! The microphone is an exclusive resource. It is modelled as an owned
//! [`Microphone`] token: starting consumes it and yields a [`Recording`],
//! stopping the recording hands the token back together with the captured
//! audio. Dropping a `Recording` releases the device.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::buffer::{AudioBuffer, AudioOrigin};
use crate::audio::device::get_input_device;
use crate::constants::SAMPLE_RATE;
use crate::error::{AudioError, CaptureError};

/// A source of PCM16 LE mono audio at 8kHz.
///
/// Implementations must release the underlying device both on `stop` and
/// when dropped.
pub trait CaptureBackend: Send {
    /// Acquire the device and begin capturing
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Release the device and return everything captured since `start`
    fn stop(&mut self) -> Result<Vec<u8>, CaptureError>;

    fn is_running(&self) -> bool;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Owned handle to the capture device
pub struct Microphone {
    backend: Box<dyn CaptureBackend>,
}

impl Microphone {
    pub fn new(backend: impl CaptureBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    /// Start recording. On failure the token is handed back untouched.
    pub fn start(mut self) -> Result<Recording, (Microphone, CaptureError)> {
        match self.backend.start() {
            Ok(()) => {
                tracing::info!("Recording started on {}", self.backend.name());
                Ok(Recording {
                    backend: self.backend,
                    started_at: Instant::now(),
                })
            }
            Err(e) => Err((self, e)),
        }
    }
}

/// A capture in progress
pub struct Recording {
    backend: Box<dyn CaptureBackend>,
    started_at: Instant,
}

impl Recording {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stop recording and collect the audio
    pub fn stop(mut self) -> (Microphone, Result<AudioBuffer, AudioError>) {
        let result = self
            .backend
            .stop()
            .map_err(AudioError::from)
            .and_then(|pcm| AudioBuffer::new(pcm, AudioOrigin::Microphone));

        if let Ok(buffer) = &result {
            tracing::info!(
                "Recording stopped after {:.1}s: {} samples",
                self.started_at.elapsed().as_secs_f32(),
                buffer.sample_count()
            );
        }

        (Microphone { backend: self.backend }, result)
    }
}

/// cpal-backed microphone capture
pub struct CpalCapture {
    /// Device identifier, `None` for the host default
    device_id: Option<String>,

    /// Whether capture is running
    running: Arc<AtomicBool>,

    /// Captured PCM16 LE bytes
    pcm: Arc<Mutex<Vec<u8>>>,

    /// Stream thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Channel for stream errors
    error_rx: Option<Receiver<CaptureError>>,

    /// Total samples captured
    samples_captured: Arc<AtomicU64>,

    /// Stream configuration
    config: StreamConfig,

    name: String,
}

impl CpalCapture {
    /// Capture from the given device, or the default input when `None`
    pub fn new(device_id: Option<&str>) -> Self {
        Self {
            device_id: device_id.map(str::to_string),
            running: Arc::new(AtomicBool::new(false)),
            pcm: Arc::new(Mutex::new(Vec::new())),
            thread_handle: None,
            error_rx: None,
            samples_captured: Arc::new(AtomicU64::new(0)),
            config: StreamConfig {
                channels: 1,
                sample_rate: cpal::SampleRate(SAMPLE_RATE),
                buffer_size: cpal::BufferSize::Default,
            },
            name: format!("cpal:{}", device_id.unwrap_or("default")),
        }
    }

    /// Get total samples captured
    pub fn samples_captured(&self) -> u64 {
        self.samples_captured.load(Ordering::Relaxed)
    }

    /// Check for errors
    pub fn check_errors(&self) -> Option<CaptureError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }

    fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                CaptureError::DeviceNotFound("Device no longer available".to_string())
            }
            cpal::BuildStreamError::StreamConfigNotSupported => {
                CaptureError::UnsupportedFormat(format!("{}Hz mono", SAMPLE_RATE))
            }
            cpal::BuildStreamError::BackendSpecific { err }
                if err.description.to_lowercase().contains("permission") =>
            {
                CaptureError::PermissionDenied
            }
            other => CaptureError::StreamError(other.to_string()),
        }
    }

    fn join_thread(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl CaptureBackend for CpalCapture {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let device = get_input_device(self.device_id.as_deref())?;
        let (error_tx, error_rx) = bounded::<CaptureError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), CaptureError>>(1);
        self.error_rx = Some(error_rx);

        self.pcm.lock().clear();
        self.samples_captured.store(0, Ordering::SeqCst);

        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let pcm = self.pcm.clone();
        let samples_captured = self.samples_captured.clone();
        let config = self.config.clone();

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("capture-mic".to_string())
            .spawn(move || {
                let stream = device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }

                        samples_captured.fetch_add(data.len() as u64, Ordering::Relaxed);

                        let mut pcm = pcm.lock();
                        pcm.reserve(data.len() * 2);
                        for &sample in data {
                            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                            pcm.extend_from_slice(&value.to_le_bytes());
                        }
                    },
                    move |err| {
                        let _ = error_tx.try_send(CaptureError::StreamError(err.to_string()));
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(Self::map_build_error(e)));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(CaptureError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep thread alive while running
                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }

                // Stream is dropped here, releasing the device
            })
            .map_err(|e| CaptureError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);

        let ready = ready_rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap_or_else(|_| Err(CaptureError::StreamError("Stream start timed out".to_string())));

        if let Err(e) = ready {
            self.join_thread();
            return Err(e);
        }

        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<u8>, CaptureError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyReleased);
        }

        self.join_thread();

        while let Some(err) = self.check_errors() {
            tracing::warn!("Capture stream reported: {}", err);
        }

        Ok(std::mem::take(&mut *self.pcm.lock()))
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.join_thread();
    }
}

/// Capture backend that replays prepared PCM, for headless runs and tests
pub struct MemoryCapture {
    pcm: Vec<u8>,
    running: bool,
    fail_with: Option<fn() -> CaptureError>,
}

impl MemoryCapture {
    pub fn new(pcm: Vec<u8>) -> Self {
        Self {
            pcm,
            running: false,
            fail_with: None,
        }
    }

    /// A backend whose `start` always fails with the given error
    pub fn failing(fail_with: fn() -> CaptureError) -> Self {
        Self {
            pcm: Vec::new(),
            running: false,
            fail_with: Some(fail_with),
        }
    }
}

impl CaptureBackend for MemoryCapture {
    fn start(&mut self) -> Result<(), CaptureError> {
        if let Some(fail) = self.fail_with {
            return Err(fail());
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<u8>, CaptureError> {
        if !self.running {
            return Err(CaptureError::AlreadyReleased);
        }
        self.running = false;
        Ok(self.pcm.clone())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn name(&self) -> &str {
        "memory"
    }
}
