//! Audio Device Enumeration and Lookup

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Type of audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Input,
    Output,
}

/// Represents an audio device (input or output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Human-readable device name, also used for lookup
    pub name: String,

    pub device_type: DeviceType,

    /// Whether this is the system default device
    pub is_default: bool,

    /// Supported sample rates (may be empty if querying failed)
    pub sample_rates: Vec<u32>,

    /// Maximum supported channels
    pub max_channels: u16,
}

impl AudioDevice {
    /// Enumerate all available audio devices
    pub fn enumerate_all() -> CoreResult<Vec<AudioDevice>> {
        let host = cpal::default_host();
        let mut devices = Vec::new();

        let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
        let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

        if let Ok(inputs) = host.input_devices() {
            for device in inputs {
                if let Ok(d) =
                    Self::from_cpal_device(&device, DeviceType::Input, default_input_name.as_deref())
                {
                    devices.push(d);
                }
            }
        }
        if let Ok(outputs) = host.output_devices() {
            for device in outputs {
                if let Ok(d) = Self::from_cpal_device(
                    &device,
                    DeviceType::Output,
                    default_output_name.as_deref(),
                ) {
                    devices.push(d);
                }
            }
        }

        if devices.is_empty() {
            return Err(CoreError::NoDevicesFound);
        }
        Ok(devices)
    }

    /// Find a cpal device by name, or the host default when `name` is `None`
    pub fn open(device_type: DeviceType, name: Option<&str>) -> CoreResult<cpal::Device> {
        let host = cpal::default_host();
        let Some(name) = name else {
            return match device_type {
                DeviceType::Input => host.default_input_device(),
                DeviceType::Output => host.default_output_device(),
            }
            .ok_or(CoreError::NoDevicesFound);
        };

        let mut candidates = match device_type {
            DeviceType::Input => host.input_devices(),
            DeviceType::Output => host.output_devices(),
        }
        .map_err(|e| CoreError::DeviceNotFound(e.to_string()))?;

        candidates
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| CoreError::DeviceNotFound(name.to_string()))
    }

    fn from_cpal_device(
        device: &cpal::Device,
        device_type: DeviceType,
        default_name: Option<&str>,
    ) -> CoreResult<Self> {
        let name = device
            .name()
            .map_err(|e| CoreError::DeviceNotFound(e.to_string()))?;
        let is_default = default_name.map(|d| d == name).unwrap_or(false);

        let (sample_rates, max_channels) = match device_type {
            DeviceType::Input => device
                .supported_input_configs()
                .map(Self::extract_config_info)
                .unwrap_or((vec![], 2)),
            DeviceType::Output => device
                .supported_output_configs()
                .map(Self::extract_config_info)
                .unwrap_or((vec![], 2)),
        };

        Ok(AudioDevice {
            name,
            device_type,
            is_default,
            sample_rates,
            max_channels,
        })
    }

    fn extract_config_info(
        configs: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    ) -> (Vec<u32>, u16) {
        const COMMON_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

        let mut sample_rates = Vec::new();
        let mut max_channels = 0u16;
        for config in configs {
            max_channels = max_channels.max(config.channels());
            let min = config.min_sample_rate().0;
            let max = config.max_sample_rate().0;
            for &rate in &COMMON_RATES {
                if rate >= min && rate <= max && !sample_rates.contains(&rate) {
                    sample_rates.push(rate);
                }
            }
        }
        sample_rates.sort_unstable();
        (sample_rates, max_channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_device_serialization() {
        let device = AudioDevice {
            name: "Test Device".to_string(),
            device_type: DeviceType::Input,
            is_default: true,
            sample_rates: vec![44100, 48000],
            max_channels: 2,
        };

        let json = serde_json::to_string(&device).unwrap();
        let deserialized: AudioDevice = serde_json::from_str(&json).unwrap();
        assert_eq!(device.name, deserialized.name);
        assert_eq!(device.device_type, deserialized.device_type);
        assert_eq!(deserialized.sample_rates, vec![44100, 48000]);
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_enumerate_all_devices() {
        assert!(AudioDevice::enumerate_all().is_ok());
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_open_default_output() {
        assert!(AudioDevice::open(DeviceType::Output, None).is_ok());
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_open_unknown_name_fails() {
        let result = AudioDevice::open(DeviceType::Output, Some("no such device 1234"));
        assert!(matches!(result, Err(CoreError::DeviceNotFound(_))));
    }
}
