//! eq10 Core - Controller Engine
//!
//! This crate provides the controller side of eq10, including:
//! - Parameter store, presets and band-group shortcuts
//! - Transport against a sample-accurate rendering graph
//! - MIDI Control-Change mapping and learn mode
//! - Recording, readiness checking and export
//! - Key/value persistence of presets, mappings, playlist and session
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   UI / CLI Thread                           │
//! │        ──Command──▶ Engine ◀──Event──                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ crossbeam-channel
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Controller Thread                          │
//! │  ParameterStore · Transport · MIDI · Recording · Playlist   │
//! │        ▲ WorkerEvent (open, waveform, finalize, export)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ rtrb (snapshots, segments)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Audio Callback                            │
//! │      Renderer: source ──▶ Equalizer ──▶ output + meter      │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod capture;
mod config;
mod device;
mod engine;
mod equalizer;
mod error;
mod export;
mod message;
mod midi;
mod params;
mod persistence;
mod playlist;
mod recording;
mod render;
mod source;
mod stream;
mod transport;
mod waveform;

pub use capture::{CaptureBackend, DeviceCapture};
pub use config::{EngineConfig, ExportConfig, ReadinessPolicy, StreamConfig, SUPPORTED_BITRATES};
pub use device::{AudioDevice, DeviceType};
pub use engine::{Controller, Engine};
pub use equalizer::{BandGroups, HIGH_BANDS, LOW_BANDS, MID_BANDS};
pub use error::{CoreError, CoreResult};
pub use export::{
    encode_to, export_file_name, pcm16, spawn_export, verify_output, ExportFormat, Exporter,
    LameEncoder, StreamEncoder,
};
pub use message::{Command, Event, WorkerEvent};
pub use midi::{
    cc_to_gain_db, cc_to_master_gain, decode as decode_midi, ControlChange, MappedParameter,
    MidiMapping, MidiMappingTable, MASTER_LABEL, UNASSIGNED_CC,
};
pub use params::{builtin_presets, EqualizerPreset, ParameterStore};
pub use persistence::{
    FileStore, KeyValueStore, MappingRecord, MemoryStore, Persistence, PlaylistRecord,
    PresetRecord, SessionRecord,
};
pub use playlist::{Playlist, PlaylistItem};
pub use recording::{
    check_ready, spawn_finalizer, wait_until_ready, RecordingSession, RecordingState, WavCapture,
};
pub use render::{render_channel, RenderFeedback, RenderGraph, RenderHandle, Renderer, Segment};
pub use source::{open_source, probe, SourceBuffer, SourceInfo};
pub use stream::{InputStream, OutputStream};
pub use transport::{format_time, TransportController};
pub use waveform::{spawn_waveform, WaveformState};

// Re-export DSP types for convenience
pub use eq10_dsp::{EqSnapshot, Equalizer, EqualizerBand, FilterShape, LedLadder, BAND_COUNT};
