//! Message Types for Thread Communication
//!
//! Commands flow from the UI to the controller.
//! Events flow from the controller to the UI.
//! Worker events flow from background workers to the controller.

use std::path::PathBuf;
use std::sync::Arc;

use eq10_dsp::{FilterShape, BAND_COUNT};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::equalizer::BandGroups;
use crate::error::{CoreError, CoreResult};
use crate::export::ExportFormat;
use crate::midi::MappedParameter;
use crate::recording::RecordingState;
use crate::source::{SourceBuffer, SourceInfo};

/// Commands sent from the UI to the controller
#[derive(Debug, Clone)]
pub enum Command {
    /// Open a source and play it from the start
    Load(PathBuf),

    /// Load a playlist entry
    PlayItem(Uuid),

    TogglePlayback,

    /// Jump to a fraction of the source and resume
    SeekAndResume(f32),

    /// Raised while the position slider is being dragged
    SetSeeking(bool),

    /// Set gain for a single band (band_index, gain_db)
    UpdateBand { band: usize, gain_db: f32 },

    SetBandShape { band: usize, shape: FilterShape },

    SetBandBypass { band: usize, bypass: bool },

    /// Linear master gain (0.0 - 2.0)
    SetMasterGain(f32),

    /// Apply a preset by name; `with_bypass` bypasses its zero-gain bands
    ApplyPreset { name: String, with_bypass: bool },

    ApplyBandGroup(BandGroups),

    ResetToDefault,

    /// Save the current bands as a user preset
    SavePreset(String),

    DeletePreset(Uuid),

    /// Assign a CC; `force` moves it away from its current holder
    AssignCc {
        parameter: MappedParameter,
        cc: i16,
        force: bool,
    },

    /// Next Control-Change assigns its CC to `parameter`
    StartMidiLearn(MappedParameter),

    CancelMidiLearn,

    StartRecording,

    StopRecording,

    Export { source: PathBuf, format: ExportFormat },

    /// Probe a file and append it to the playlist
    AddToPlaylist(PathBuf),

    RemoveFromPlaylist(Uuid),

    /// Request current state (triggers StateUpdate event)
    RequestState,

    /// Shutdown the engine
    Shutdown,
}

/// Events sent from the controller to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// A source is loaded and playing
    Loaded {
        title: String,
        duration_secs: f64,
    },

    LoadFailed {
        message: String,
    },

    PlaybackChanged {
        playing: bool,
    },

    /// Periodic position update (~30 fps while playing)
    Progress {
        progress: f32,
        elapsed: String,
        remaining: String,
    },

    /// Loudness of the latest rendered block and how many LEDs it lights
    Level {
        db: f32,
        lit: usize,
    },

    WaveformLoading,

    WaveformReady {
        samples: Vec<f32>,
    },

    /// Band or master gain changed
    ParametersChanged {
        gains: [f32; BAND_COUNT],
        bypass: [bool; BAND_COUNT],
        master_gain: f32,
        active_preset: Option<String>,
    },

    PresetsChanged {
        names: Vec<String>,
    },

    MappingChanged {
        parameter: String,
        cc: i16,
    },

    RecordingStateChanged {
        state: RecordingState,
    },

    /// A finished recording passed the readiness check
    RecordingReady {
        path: PathBuf,
    },

    ExportFinished {
        path: PathBuf,
        format: ExportFormat,
    },

    ExportFailed {
        format: ExportFormat,
        message: String,
    },

    PlaylistChanged {
        titles: Vec<String>,
    },

    /// Current state snapshot
    StateUpdate {
        playing: bool,
        progress: f32,
        recording: RecordingState,
        active_preset: Option<String>,
    },

    /// Captured audio was dropped because the writer fell behind
    BufferOverrun,

    /// Error occurred
    Error {
        message: String,
    },

    /// Engine stopped
    Stopped,
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}

/// Results posted back by background workers
#[derive(Debug)]
pub enum WorkerEvent {
    SourceOpened {
        result: CoreResult<(SourceInfo, Arc<SourceBuffer>)>,
        path: PathBuf,
    },
    Probed {
        result: CoreResult<SourceInfo>,
    },
    Waveform {
        generation: u64,
        samples: Vec<f32>,
    },
    /// The capture device for `path` never came up
    CaptureFailed {
        path: PathBuf,
        error: CoreError,
    },
    RecordingFinalized {
        path: PathBuf,
        result: CoreResult<SourceInfo>,
    },
    ExportFinished {
        format: ExportFormat,
        result: CoreResult<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::Level { db: -12.5, lit: 8 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Level\""));
        assert!(json.contains("-12.5"));

        let deserialized: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[test]
    fn test_recording_ready_serialization() {
        let event = Event::RecordingReady {
            path: PathBuf::from("/tmp/take.wav"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("RecordingReady"));
        assert!(json.contains("take.wav"));
    }

    #[test]
    fn test_error_event() {
        let event = Event::error("Test error");
        match event {
            Event::Error { message } => assert_eq!(message, "Test error"),
            _ => panic!("Expected Error event"),
        }
    }
}
