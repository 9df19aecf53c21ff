//! Input device enumeration

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::constants::SAMPLE_RATE;
use crate::error::CaptureError;

/// Description of a capture device
#[derive(Debug, Clone, Serialize)]
pub struct InputDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    /// Whether the device can deliver 8kHz mono directly
    pub supports_native_format: bool,
}

/// List all available input devices
pub fn list_input_devices() -> Vec<InputDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(name) = device.name() {
                devices.push(InputDeviceInfo {
                    id: format!("input:{}", name),
                    is_default: default_name.as_ref() == Some(&name),
                    supports_native_format: supports_native_format(&device),
                    name,
                });
            }
        }
    }

    devices
}

/// Check whether any supported input range covers 8kHz mono
pub fn supports_native_format(device: &cpal::Device) -> bool {
    let rate = cpal::SampleRate(SAMPLE_RATE);
    device
        .supported_input_configs()
        .map(|mut configs| {
            configs.any(|c| c.channels() == 1 && rate >= c.min_sample_rate() && rate <= c.max_sample_rate())
        })
        .unwrap_or(false)
}

/// Resolve an input device by ID, or the host default when `id` is `None`
pub fn get_input_device(id: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();

    let Some(id) = id else {
        return host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceNotFound("No default input device".to_string()));
    };

    let name = id.strip_prefix("input:").unwrap_or(id);
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::DeviceNotFound(e.to_string()))?;

    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }

    Err(CaptureError::DeviceNotFound(id.to_string()))
}
