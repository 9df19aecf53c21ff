//! RMS amplitude extraction
//!
//! Converts PCM into one brightness byte per fixed-size window. The
//! peripheral maps these bytes straight to actuator intensity, so the
//! scale constant cannot change without a firmware update.

use crate::audio::buffer::AudioBuffer;
use crate::constants::{BRIGHTNESS_SCALE, WINDOW_SIZE};

/// Brightness (0..=255) of one window of samples. Empty windows are dark.
pub fn brightness_of(window: &[i16]) -> u8 {
    scaled_brightness(window, BRIGHTNESS_SCALE)
}

/// Brightness with a custom full-scale RMS
pub fn scaled_brightness(window: &[i16], scale: f64) -> u8 {
    if window.is_empty() {
        return 0;
    }

    let sum_squares: f64 = window
        .iter()
        .map(|&s| {
            let s = s as f64;
            s * s
        })
        .sum();
    let rms = (sum_squares / window.len() as f64).sqrt();

    (rms / scale * 255.0).round().clamp(0.0, 255.0) as u8
}

/// One brightness byte per `window_size` samples, in order.
///
/// The last window takes whatever remains, so the track length is
/// `ceil(samples.len() / window_size)`.
///
/// # Panics
///
/// Panics if `window_size` is zero.
pub fn extract_track(samples: &[i16], window_size: usize) -> Vec<u8> {
    assert!(window_size > 0, "window size must be non-zero");
    samples.chunks(window_size).map(brightness_of).collect()
}

/// Track extractor bound to a window size
#[derive(Debug, Clone, Copy)]
pub struct AmplitudeExtractor {
    window_size: usize,
    scale: f64,
}

impl AmplitudeExtractor {
    pub fn new(window_size: usize) -> Self {
        assert!(window_size > 0, "window size must be non-zero");
        Self {
            window_size,
            scale: BRIGHTNESS_SCALE,
        }
    }

    /// Override the RMS mapped to full brightness
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Brightness track for a whole buffer
    pub fn extract(&self, audio: &AudioBuffer) -> Vec<u8> {
        audio
            .samples()
            .chunks(self.window_size)
            .map(|window| scaled_brightness(window, self.scale))
            .collect()
    }
}

impl Default for AmplitudeExtractor {
    fn default() -> Self {
        Self::new(WINDOW_SIZE)
    }
}
