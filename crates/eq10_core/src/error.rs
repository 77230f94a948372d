//! Core Error Types

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the controller, recording and export paths
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to open source {path:?}: {reason}")]
    SourceOpen { path: PathBuf, reason: String },

    #[error("Source is {source_rate} Hz but the output runs at {output_rate} Hz")]
    SampleRateMismatch { source_rate: u32, output_rate: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("DSP error: {0}")]
    Dsp(#[from] eq10_dsp::DspError),

    #[error("CC {cc} is already assigned to {holder}")]
    DuplicateCc { cc: i16, holder: String },

    #[error("CC number out of range: {0} (must be 0-127 or -1)")]
    InvalidCc(i16),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Preset name must not be empty")]
    EmptyPresetName,

    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    #[error("Malformed preset: {0}")]
    InvalidPreset(String),

    #[error("Recording not ready after {attempts} attempts: {path:?}")]
    RecordingNotReady { path: PathBuf, attempts: u32 },

    #[error("Recording already in progress")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("Export output is truncated: expected {expected} bytes, found {found}")]
    TruncatedOutput { expected: u64, found: u64 },

    #[error("No audio devices found")]
    NoDevicesFound,

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to play audio stream: {0}")]
    StreamPlayError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel send error - receiver dropped")]
    ChannelSendError,
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::DuplicateCc {
            cc: 16,
            holder: "1K".into(),
        };
        assert!(err.to_string().contains("16"));
        assert!(err.to_string().contains("1K"));

        let err = CoreError::RecordingNotReady {
            path: PathBuf::from("take.wav"),
            attempts: 5,
        };
        assert!(err.to_string().contains("5 attempts"));

        let err = CoreError::SampleRateMismatch {
            source_rate: 44100,
            output_rate: 48000,
        };
        assert!(err.to_string().contains("44100 Hz"));
    }

    #[test]
    fn test_error_from_dsp() {
        let dsp_err = eq10_dsp::DspError::InvalidBandIndex(10);
        let err: CoreError = dsp_err.into();
        assert!(matches!(err, CoreError::Dsp(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CoreError = io.into();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
