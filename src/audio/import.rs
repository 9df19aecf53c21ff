//! Audio file import
//!
//! Decodes a WAV file into an `AudioBuffer`. Only the pipeline's native
//! format (8kHz mono 16-bit PCM) is accepted; resampling happens upstream.

use std::path::Path;

use hound::{SampleFormat, WavReader};
use tracing::info;

use crate::audio::buffer::{AudioBuffer, AudioOrigin};
use crate::constants::SAMPLE_RATE;
use crate::error::ImportError;

/// Read a WAV file and return its samples as PCM16 LE bytes
pub fn import_wav(path: impl AsRef<Path>) -> Result<AudioBuffer, ImportError> {
    let path = path.as_ref();
    info!("Importing audio file: {}", path.display());

    let reader = WavReader::open(path).map_err(|e| ImportError::Open {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let spec = reader.spec();
    if spec.sample_rate != SAMPLE_RATE
        || spec.channels != 1
        || spec.bits_per_sample != 16
        || spec.sample_format != SampleFormat::Int
    {
        return Err(ImportError::UnsupportedFormat {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits: spec.bits_per_sample,
        });
    }

    let samples: Vec<i16> = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ImportError::Decode(e.to_string()))?;

    let buffer = AudioBuffer::from_samples(&samples, AudioOrigin::Import);

    info!(
        "Audio file loaded: {:.1}s, {} samples",
        buffer.duration_ms() as f64 / 1000.0,
        buffer.sample_count()
    );

    Ok(buffer)
}
