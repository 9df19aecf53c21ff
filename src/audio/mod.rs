//! Audio subsystem module

pub mod amplitude;
pub mod buffer;
pub mod capture;
pub mod device;
pub mod import;

pub use amplitude::{brightness_of, extract_track, scaled_brightness, AmplitudeExtractor};
pub use buffer::{decode_pcm16_le, decode_pcm16_le_truncating, AudioBuffer, AudioOrigin};
pub use capture::{CaptureBackend, CpalCapture, MemoryCapture, Microphone, Recording};
pub use device::{list_input_devices, InputDeviceInfo};
pub use import::import_wav;
