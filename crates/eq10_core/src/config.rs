//! Engine, Stream and Pipeline Configuration

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Bitrates the lossy encoder accepts (kbps)
pub const SUPPORTED_BITRATES: [u32; 8] = [96, 112, 128, 160, 192, 224, 256, 320];

/// Audio stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Buffer size in frames (lower = less latency, higher = more stability)
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 512,
        }
    }
}

impl StreamConfig {
    /// Calculate latency in milliseconds for this configuration
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.channels == 0 || self.channels > 8 {
            return Err(format!("Invalid channel count: {}", self.channels));
        }
        if self.buffer_size < 32 || self.buffer_size > 8192 {
            return Err(format!("Invalid buffer size: {}", self.buffer_size));
        }
        Ok(())
    }
}

/// Bounded polling used to decide whether a finished recording is usable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    /// File must be strictly larger than this (excludes empty containers)
    pub min_bytes: u64,
    /// Number of checks before giving up
    pub attempts: u32,
    /// Fixed delay between checks
    pub backoff_ms: u64,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            min_bytes: 1024,
            attempts: 5,
            backoff_ms: 200,
        }
    }
}

impl ReadinessPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Worst-case time spent polling
    pub fn budget(&self) -> Duration {
        self.backoff() * self.attempts
    }
}

/// Export destination and lossy bitrates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Scratch directory; platform cache dir when unset
    pub dir: Option<PathBuf>,
    pub high_kbps: u32,
    pub low_kbps: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: None,
            high_kbps: 256,
            low_kbps: 128,
        }
    }
}

impl ExportConfig {
    /// Directory exported files are written to
    pub fn scratch_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        ProjectDirs::from("com", "eq10", "eq10")
            .map(|proj| proj.cache_dir().join("exports"))
            .unwrap_or_else(|| std::env::temp_dir().join("eq10-exports"))
    }

    pub fn validate(&self) -> Result<(), String> {
        for kbps in [self.high_kbps, self.low_kbps] {
            if !SUPPORTED_BITRATES.contains(&kbps) {
                return Err(format!("Unsupported bitrate: {} kbps", kbps));
            }
        }
        if self.low_kbps >= self.high_kbps {
            return Err(format!(
                "Low bitrate ({}) must be below high bitrate ({})",
                self.low_kbps, self.high_kbps
            ));
        }
        Ok(())
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Stream configuration
    pub stream: StreamConfig,

    /// Capacity of the control -> render and render -> control rings
    pub ring_capacity: usize,

    /// Progress refresh period while playing (~30 fps)
    pub progress_interval_ms: u64,

    /// Waveform display cap in points
    pub waveform_cap: usize,

    pub readiness: ReadinessPolicy,

    pub export: ExportConfig,

    /// Where recordings are written; platform data dir when unset
    #[serde(default)]
    pub recordings_dir: Option<PathBuf>,

    /// Capture ring size in samples (~2 s of stereo at 48 kHz)
    pub capture_ring_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            ring_capacity: 64,
            progress_interval_ms: 33,
            waveform_cap: eq10_dsp::DISPLAY_CAP,
            readiness: ReadinessPolicy::default(),
            export: ExportConfig::default(),
            recordings_dir: None,
            capture_ring_capacity: 192_000,
        }
    }
}

impl EngineConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 128, // ~2.6ms latency
            },
            ring_capacity: 256,
            ..Default::default()
        }
    }

    /// Create config optimized for stability
    pub fn stable() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 1024, // ~21ms latency
            },
            ..Default::default()
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn recordings_dir(&self) -> PathBuf {
        if let Some(dir) = &self.recordings_dir {
            return dir.clone();
        }
        ProjectDirs::from("com", "eq10", "eq10")
            .map(|proj| proj.data_dir().join("recordings"))
            .unwrap_or_else(|| std::env::temp_dir().join("eq10-recordings"))
    }

    pub fn validate(&self) -> Result<(), String> {
        self.stream.validate()?;
        self.export.validate()?;
        if self.ring_capacity < 8 {
            return Err(format!("Ring capacity too small: {}", self.ring_capacity));
        }
        if self.progress_interval_ms == 0 {
            return Err("Progress interval must be non-zero".to_string());
        }
        if self.waveform_cap == 0 {
            return Err("Waveform cap must be non-zero".to_string());
        }
        if self.capture_ring_capacity < self.stream.buffer_size as usize * 4 {
            return Err(format!(
                "Capture ring too small: {}",
                self.capture_ring_capacity
            ));
        }
        if self.readiness.attempts == 0 {
            return Err("Readiness check needs at least one attempt".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.stream.sample_rate, 48000);
        assert_eq!(config.stream.channels, 2);
        assert_eq!(config.progress_interval(), Duration::from_millis(33));
        assert_eq!(config.waveform_cap, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_latency_calculation() {
        let config = StreamConfig {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 480, // Exactly 10ms at 48kHz
        };
        assert!((config.latency_ms() - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_stream_validation() {
        let invalid_rate = StreamConfig {
            sample_rate: 100,
            ..Default::default()
        };
        assert!(invalid_rate.validate().is_err());

        let invalid_channels = StreamConfig {
            channels: 0,
            ..Default::default()
        };
        assert!(invalid_channels.validate().is_err());

        let invalid_buffer = StreamConfig {
            buffer_size: 10,
            ..Default::default()
        };
        assert!(invalid_buffer.validate().is_err());
    }

    #[test]
    fn test_readiness_budget_is_about_one_second() {
        let policy = ReadinessPolicy::default();
        assert_eq!(policy.min_bytes, 1024);
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.budget(), Duration::from_millis(1000));
    }

    #[test]
    fn test_export_bitrate_validation() {
        assert!(ExportConfig::default().validate().is_ok());

        let odd = ExportConfig {
            high_kbps: 250,
            ..Default::default()
        };
        assert!(odd.validate().is_err());

        let inverted = ExportConfig {
            high_kbps: 128,
            low_kbps: 256,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_explicit_scratch_dir() {
        let config = ExportConfig {
            dir: Some(PathBuf::from("/tmp/eq10-test")),
            ..Default::default()
        };
        assert_eq!(config.scratch_dir(), PathBuf::from("/tmp/eq10-test"));
    }

    #[test]
    fn test_preset_configs() {
        let low_latency = EngineConfig::low_latency();
        let stable = EngineConfig::stable();

        assert!(low_latency.stream.buffer_size < stable.stream.buffer_size);
        assert!(low_latency.stream.latency_ms() < stable.stream.latency_ms());
        assert!(low_latency.validate().is_ok());
        assert!(stable.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: EngineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.stream.sample_rate, deserialized.stream.sample_rate);
        assert_eq!(config.readiness, deserialized.readiness);
        assert_eq!(config.export.high_kbps, deserialized.export.high_kbps);
    }
}
