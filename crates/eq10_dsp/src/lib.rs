//! eq10 DSP - Signal processing building blocks
//!
//! This crate provides the pieces of the signal chain that do arithmetic on
//! samples:
//! - 10-band equalizer model and BiQuad cascade
//! - Level meter (RMS to dB) and LED ladder display mapping
//! - Waveform decimation for bounded-size display
//! - Built-in preset table
//!
//! # Architecture
//!
//! The real-time pieces ([`Equalizer`], [`LevelMeter`]) follow a strict "no
//! allocation in audio callback" rule. Parameter changes reach them as
//! [`EqSnapshot`] copies between blocks.

mod eq;
mod error;
mod meter;
mod presets;
mod waveform;

pub use eq::{
    EqSnapshot, Equalizer, EqualizerBand, FilterShape, BAND_COUNT, BAND_FREQUENCIES, BAND_LABELS,
    MAX_GAIN_DB, MAX_MASTER_GAIN, MIN_GAIN_DB, RESONANT_Q,
};
pub use error::DspError;
pub use meter::{
    loudness_db, rms, LedLadder, LedSegment, LevelMeter, Rgb, Threshold, LOUDNESS_EPSILON,
    METER_FLOOR_DB,
};
pub use presets::{find_preset, BuiltinPreset, PRESETS};
pub use waveform::{decimate, decimation_factor, first_channel, DISPLAY_CAP};
