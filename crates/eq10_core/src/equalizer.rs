//! Equalizer Controller
//!
//! Preset application, band-group shortcuts and bypass rules. Every
//! operation here writes only the [`ParameterStore`]; the render graph
//! picks the change up with the next published snapshot.

use std::ops::Range;

use eq10_dsp::{FilterShape, BAND_COUNT, MIN_GAIN_DB};
use tracing::debug;

use crate::params::{EqualizerPreset, ParameterStore};

/// Bands covered by the low group shortcut
pub const LOW_BANDS: Range<usize> = 0..3;
/// Bands covered by the mid group shortcut
pub const MID_BANDS: Range<usize> = 3..7;
/// Bands covered by the high group shortcut
pub const HIGH_BANDS: Range<usize> = 7..10;

const LOW_BOOST_DB: f32 = 6.0;
const MID_BOOST_DB: f32 = 5.0;
const HIGH_BOOST_DB: f32 = 6.0;

/// Which band groups a shortcut selects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BandGroups {
    pub low: bool,
    pub mid: bool,
    pub high: bool,
}

impl BandGroups {
    pub fn new(low: bool, mid: bool, high: bool) -> Self {
        Self { low, mid, high }
    }
}

impl ParameterStore {
    /// Set every band's gain and shape from `preset` and clear bypass
    pub fn apply_preset(&mut self, preset: &EqualizerPreset) {
        for (i, band) in self.bands.iter_mut().enumerate() {
            band.gain_db = preset.gains()[i];
            band.shape = preset.shape(i);
            band.bypass = false;
        }
        self.set_active_preset(Some(preset.name().to_string()));
        debug!("Applied preset '{}'", preset.name());
    }

    /// As [`apply_preset`](Self::apply_preset), then bypass every band
    /// whose preset gain is exactly zero
    pub fn apply_preset_with_bypass(&mut self, preset: &EqualizerPreset) {
        self.apply_preset(preset);
        for (band, &gain) in self.bands.iter_mut().zip(preset.gains()) {
            band.bypass = gain == 0.0;
        }
    }

    /// Boost the selected groups and pull every unselected band down to the floor.
    ///
    /// Groups don't overlap, so each band is decided by its own group alone.
    pub fn apply_band_group(&mut self, groups: BandGroups) {
        for (i, band) in self.bands.iter_mut().enumerate() {
            band.bypass = false;
            if LOW_BANDS.contains(&i) && groups.low {
                band.gain_db = LOW_BOOST_DB;
                band.shape = FilterShape::LowShelf;
            } else if MID_BANDS.contains(&i) && groups.mid {
                band.gain_db = MID_BOOST_DB;
            } else if HIGH_BANDS.contains(&i) && groups.high {
                band.gain_db = HIGH_BOOST_DB;
                band.shape = FilterShape::HighShelf;
            } else {
                band.gain_db = MIN_GAIN_DB;
                band.shape = FilterShape::Parametric;
            }
        }
        self.set_active_preset(None);
        debug!("Applied band groups {:?}", groups);
    }

    /// All bands to 0 dB, parametric, not bypassed
    pub fn reset_to_default(&mut self) {
        for band in self.bands.iter_mut() {
            band.gain_db = 0.0;
            band.shape = FilterShape::Parametric;
            band.bypass = false;
        }
        self.set_active_preset(None);
    }

    /// Write one band's gain and clear its bypass.
    ///
    /// Out-of-range indices are ignored; the gain is stored as given.
    pub fn update_band(&mut self, index: usize, gain_db: f32) {
        if index >= BAND_COUNT {
            return;
        }
        let band = &mut self.bands[index];
        band.gain_db = gain_db;
        band.bypass = false;
    }

    /// Change one band's filter shape. Out-of-range indices are ignored.
    pub fn set_band_shape(&mut self, index: usize, shape: FilterShape) {
        if let Some(band) = self.bands.get_mut(index) {
            band.shape = shape;
        }
    }

    /// Toggle one band's bypass flag. Out-of-range indices are ignored.
    pub fn set_band_bypass(&mut self, index: usize, bypass: bool) {
        if let Some(band) = self.bands.get_mut(index) {
            band.bypass = bypass;
        }
    }
}
