//! 10-Band Equalizer
//!
//! Band model, filter shapes and the read-only snapshot handed to the
//! rendering context, plus the BiQuad cascade that renders a snapshot.
//! Coefficient synthesis is delegated to the `biquad` crate (RBJ cookbook).

use std::fmt;
use std::str::FromStr;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};
use serde::{Deserialize, Serialize};

use crate::error::DspError;

/// Number of bands in the equalizer
pub const BAND_COUNT: usize = 10;

/// Fixed band center frequencies (Hz), log-spaced octaves
pub const BAND_FREQUENCIES: [f32; BAND_COUNT] = [
    32.0,    // Sub-bass
    64.0,    // Bass
    125.0,   // Low-mid
    250.0,   // Mid
    500.0,   // Mid
    1000.0,  // Upper-mid
    2000.0,  // Presence
    4000.0,  // Brilliance
    8000.0,  // High
    16000.0, // Air
];

/// Display labels for each band, also used as MIDI parameter names
pub const BAND_LABELS: [&str; BAND_COUNT] = [
    "32", "64", "125", "250", "500", "1K", "2K", "4K", "8K", "16K",
];

/// Lowest gain a band can carry (dB)
pub const MIN_GAIN_DB: f32 = -40.0;

/// Highest gain a band can carry (dB)
pub const MAX_GAIN_DB: f32 = 40.0;

/// Upper bound of the linear master gain multiplier
pub const MAX_MASTER_GAIN: f32 = 2.0;

/// Q used by the resonant filter variants
pub const RESONANT_Q: f32 = 4.0;

/// Filter shape of a single band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterShape {
    Parametric,
    LowPass,
    HighPass,
    ResonantLowPass,
    ResonantHighPass,
    BandPass,
    BandStop,
    LowShelf,
    HighShelf,
    ResonantLowShelf,
    ResonantHighShelf,
}

impl FilterShape {
    pub const ALL: [FilterShape; 11] = [
        FilterShape::Parametric,
        FilterShape::LowPass,
        FilterShape::HighPass,
        FilterShape::ResonantLowPass,
        FilterShape::ResonantHighPass,
        FilterShape::BandPass,
        FilterShape::BandStop,
        FilterShape::LowShelf,
        FilterShape::HighShelf,
        FilterShape::ResonantLowShelf,
        FilterShape::ResonantHighShelf,
    ];

    /// Stable identifier used in persisted records
    pub fn as_str(self) -> &'static str {
        match self {
            FilterShape::Parametric => "parametric",
            FilterShape::LowPass => "low_pass",
            FilterShape::HighPass => "high_pass",
            FilterShape::ResonantLowPass => "resonant_low_pass",
            FilterShape::ResonantHighPass => "resonant_high_pass",
            FilterShape::BandPass => "band_pass",
            FilterShape::BandStop => "band_stop",
            FilterShape::LowShelf => "low_shelf",
            FilterShape::HighShelf => "high_shelf",
            FilterShape::ResonantLowShelf => "resonant_low_shelf",
            FilterShape::ResonantHighShelf => "resonant_high_shelf",
        }
    }

    /// Whether the band gain shapes the response for this filter type.
    /// Pass and stop filters ignore gain.
    pub fn uses_gain(self) -> bool {
        match self {
            FilterShape::Parametric
            | FilterShape::LowShelf
            | FilterShape::HighShelf
            | FilterShape::ResonantLowShelf
            | FilterShape::ResonantHighShelf => true,
            FilterShape::LowPass
            | FilterShape::HighPass
            | FilterShape::ResonantLowPass
            | FilterShape::ResonantHighPass
            | FilterShape::BandPass
            | FilterShape::BandStop => false,
        }
    }

    fn q(self) -> f32 {
        match self {
            FilterShape::ResonantLowPass
            | FilterShape::ResonantHighPass
            | FilterShape::ResonantLowShelf
            | FilterShape::ResonantHighShelf => RESONANT_Q,
            FilterShape::Parametric
            | FilterShape::LowPass
            | FilterShape::HighPass
            | FilterShape::BandPass
            | FilterShape::BandStop
            | FilterShape::LowShelf
            | FilterShape::HighShelf => Q_BUTTERWORTH_F32,
        }
    }

    fn filter_type(self, gain_db: f32) -> Type<f32> {
        match self {
            FilterShape::Parametric => Type::PeakingEQ(gain_db),
            FilterShape::LowPass | FilterShape::ResonantLowPass => Type::LowPass,
            FilterShape::HighPass | FilterShape::ResonantHighPass => Type::HighPass,
            FilterShape::BandPass => Type::BandPass,
            FilterShape::BandStop => Type::Notch,
            FilterShape::LowShelf | FilterShape::ResonantLowShelf => Type::LowShelf(gain_db),
            FilterShape::HighShelf | FilterShape::ResonantHighShelf => Type::HighShelf(gain_db),
        }
    }
}

impl fmt::Display for FilterShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterShape {
    type Err = DspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterShape::ALL
            .iter()
            .copied()
            .find(|shape| shape.as_str() == s)
            .ok_or_else(|| DspError::UnknownShape(s.to_string()))
    }
}

/// Single EQ band
///
/// The center frequency is fixed at construction; gain, shape and bypass
/// are free to change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqualizerBand {
    frequency: f32,
    pub gain_db: f32,
    pub shape: FilterShape,
    pub bypass: bool,
}

impl EqualizerBand {
    pub fn new(frequency: f32, shape: FilterShape) -> Self {
        Self {
            frequency,
            gain_db: 0.0,
            shape,
            bypass: false,
        }
    }

    /// Default band for a slot: shelves on the outer bands, parametric inside
    pub fn for_index(index: usize) -> Result<Self, DspError> {
        let frequency = *BAND_FREQUENCIES
            .get(index)
            .ok_or(DspError::InvalidBandIndex(index))?;
        let shape = match index {
            0 => FilterShape::LowShelf,
            9 => FilterShape::HighShelf,
            _ => FilterShape::Parametric,
        };
        Ok(Self::new(frequency, shape))
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Generate BiQuad coefficients for this band
    pub fn to_coefficients(self, sample_rate: f32) -> Result<Coefficients<f32>, DspError> {
        let gain = self.gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        Coefficients::<f32>::from_params(
            self.shape.filter_type(gain),
            sample_rate.hz(),
            self.frequency.hz(),
            self.shape.q(),
        )
        .map_err(|_| DspError::InvalidCoefficients {
            frequency: self.frequency,
            sample_rate,
        })
    }
}

fn default_bands() -> [EqualizerBand; BAND_COUNT] {
    core::array::from_fn(|i| {
        let shape = match i {
            0 => FilterShape::LowShelf,
            9 => FilterShape::HighShelf,
            _ => FilterShape::Parametric,
        };
        EqualizerBand::new(BAND_FREQUENCIES[i], shape)
    })
}

/// Read-only copy of the parameter state for one render block.
///
/// `Copy` so it can travel through a lock-free ring without allocating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqSnapshot {
    pub bands: [EqualizerBand; BAND_COUNT],
    /// Linear multiplier in [0, 2]
    pub master_gain: f32,
}

impl Default for EqSnapshot {
    fn default() -> Self {
        Self {
            bands: default_bands(),
            master_gain: 1.0,
        }
    }
}

impl EqSnapshot {
    pub fn gains(&self) -> [f32; BAND_COUNT] {
        core::array::from_fn(|i| self.bands[i].gain_db)
    }
}

/// Pass-through coefficients used when a band cannot be realised at the
/// current sample rate (e.g. 16 kHz above Nyquist at 22.05 kHz).
fn identity() -> Coefficients<f32> {
    Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    }
}

/// BiQuad cascade that renders an [`EqSnapshot`]
///
/// Designed for real-time use: no allocations in `apply_snapshot()` or the
/// `process_*` methods.
pub struct Equalizer {
    // DirectForm2Transposed: better numerical stability than DF1
    filters_left: [DirectForm2Transposed<f32>; BAND_COUNT],
    filters_right: [DirectForm2Transposed<f32>; BAND_COUNT],
    // Bands whose coefficients could not be built are skipped like bypassed ones
    realisable: [bool; BAND_COUNT],
    snapshot: EqSnapshot,
    sample_rate: f32,
}

impl Equalizer {
    /// Create an equalizer with the default (flat) snapshot
    pub fn new(sample_rate: f32) -> Result<Self, DspError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }

        let snapshot = EqSnapshot::default();
        let mut realisable = [true; BAND_COUNT];
        let coeffs: [Coefficients<f32>; BAND_COUNT] = core::array::from_fn(|i| {
            snapshot.bands[i].to_coefficients(sample_rate).unwrap_or_else(|_| {
                realisable[i] = false;
                identity()
            })
        });

        Ok(Self {
            filters_left: core::array::from_fn(|i| DirectForm2Transposed::<f32>::new(coeffs[i])),
            filters_right: core::array::from_fn(|i| DirectForm2Transposed::<f32>::new(coeffs[i])),
            realisable,
            snapshot,
            sample_rate,
        })
    }

    /// Bring the filter cascade in line with `snapshot`.
    ///
    /// Only bands whose gain or shape changed get new coefficients; filter
    /// state is kept so parameter moves don't click.
    pub fn apply_snapshot(&mut self, snapshot: &EqSnapshot) {
        for (i, band) in snapshot.bands.iter().enumerate() {
            let current = &self.snapshot.bands[i];
            if current.gain_db == band.gain_db && current.shape == band.shape {
                continue;
            }
            let coeffs = match band.to_coefficients(self.sample_rate) {
                Ok(coeffs) => {
                    self.realisable[i] = true;
                    coeffs
                }
                Err(_) => {
                    self.realisable[i] = false;
                    identity()
                }
            };
            self.filters_left[i].update_coefficients(coeffs);
            self.filters_right[i].update_coefficients(coeffs);
        }
        self.snapshot = *snapshot;
    }

    /// Process a stereo sample pair through the EQ chain
    #[inline]
    pub fn process_sample(&mut self, left: f32, right: f32) -> (f32, f32) {
        let mut l = left;
        let mut r = right;

        for i in 0..BAND_COUNT {
            if self.snapshot.bands[i].bypass || !self.realisable[i] {
                continue;
            }
            l = self.filters_left[i].run(l);
            r = self.filters_right[i].run(r);
        }

        let gain = self.snapshot.master_gain;
        (l * gain, r * gain)
    }

    /// Process an interleaved buffer in-place.
    ///
    /// Mono buffers run through the left chain only; channels beyond the
    /// second receive master gain but no filtering.
    #[inline]
    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize) {
        match channels {
            0 => {}
            1 => {
                for sample in buffer.iter_mut() {
                    let (l, _) = self.process_sample(*sample, 0.0);
                    *sample = l;
                }
            }
            _ => {
                let gain = self.snapshot.master_gain;
                for frame in buffer.chunks_exact_mut(channels) {
                    let (l, r) = self.process_sample(frame[0], frame[1]);
                    frame[0] = l;
                    frame[1] = r;
                    for extra in frame[2..].iter_mut() {
                        *extra *= gain;
                    }
                }
            }
        }
    }

    /// Snapshot currently rendered
    pub fn snapshot(&self) -> &EqSnapshot {
        &self.snapshot
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Reset filter state (clear delay lines)
    ///
    /// Call when switching audio sources to prevent filter ringing
    pub fn reset(&mut self) {
        for i in 0..BAND_COUNT {
            self.filters_left[i].reset_state();
            self.filters_right[i].reset_state();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_peak(eq: &mut Equalizer, freq: f32, sample_rate: f32) -> f32 {
        let mut peak = 0.0_f32;
        for i in 0..4800 {
            let t = i as f32 / sample_rate;
            let sample = (2.0 * std::f32::consts::PI * freq * t).sin() * 0.25;
            let (out, _) = eq.process_sample(sample, sample);
            // Skip the transient
            if i > 2400 {
                peak = peak.max(out.abs());
            }
        }
        peak
    }

    #[test]
    fn test_default_snapshot_is_flat() {
        let snapshot = EqSnapshot::default();
        for band in &snapshot.bands {
            assert_eq!(band.gain_db, 0.0, "Default should be flat (0dB)");
            assert!(!band.bypass);
        }
        assert_eq!(snapshot.master_gain, 1.0);
    }

    #[test]
    fn test_band_frequencies_are_log_spaced() {
        let snapshot = EqSnapshot::default();
        for (i, band) in snapshot.bands.iter().enumerate() {
            assert_eq!(band.frequency(), BAND_FREQUENCIES[i]);
        }
        assert_eq!(BAND_FREQUENCIES[0], 32.0);
        assert_eq!(BAND_FREQUENCIES[9], 16000.0);
    }

    #[test]
    fn test_outer_bands_are_shelves() {
        let snapshot = EqSnapshot::default();
        assert_eq!(snapshot.bands[0].shape, FilterShape::LowShelf);
        assert_eq!(snapshot.bands[9].shape, FilterShape::HighShelf);
        for i in 1..9 {
            assert_eq!(snapshot.bands[i].shape, FilterShape::Parametric);
        }
    }

    #[test]
    fn test_for_index_bounds() {
        assert!(EqualizerBand::for_index(9).is_ok());
        assert_eq!(
            EqualizerBand::for_index(10),
            Err(DspError::InvalidBandIndex(10))
        );
    }

    #[test]
    fn test_shape_string_roundtrip() {
        for shape in FilterShape::ALL {
            assert_eq!(shape.as_str().parse::<FilterShape>().unwrap(), shape);
        }
        assert!("wobble".parse::<FilterShape>().is_err());
    }

    #[test]
    fn test_shape_serde_matches_as_str() {
        let json = serde_json::to_string(&FilterShape::ResonantHighShelf).unwrap();
        assert_eq!(json, "\"resonant_high_shelf\"");
    }

    #[test]
    fn test_invalid_sample_rate() {
        assert!(Equalizer::new(0.0).is_err());
        assert!(Equalizer::new(f32::NAN).is_err());
        assert_eq!(Equalizer::new(44100.0).unwrap().sample_rate(), 44100.0);
    }

    #[test]
    fn test_band_above_nyquist_is_skipped() {
        // 16 kHz cannot be realised at 8 kHz; it must pass through
        let mut eq = Equalizer::new(8000.0).unwrap();
        let mut snapshot = EqSnapshot::default();
        snapshot.bands[9].gain_db = 20.0;
        eq.apply_snapshot(&snapshot);

        for _ in 0..100 {
            let (l, r) = eq.process_sample(0.5, -0.5);
            assert!(l.is_finite() && r.is_finite());
        }
    }

    #[test]
    fn test_bypassed_band_is_pass_through() {
        let mut boosted = Equalizer::new(48000.0).unwrap();
        let mut bypassed = Equalizer::new(48000.0).unwrap();

        let mut snapshot = EqSnapshot::default();
        snapshot.bands[5].gain_db = 12.0;
        boosted.apply_snapshot(&snapshot);
        snapshot.bands[5].bypass = true;
        bypassed.apply_snapshot(&snapshot);

        let boosted_peak = sine_peak(&mut boosted, 1000.0, 48000.0);
        let bypassed_peak = sine_peak(&mut bypassed, 1000.0, 48000.0);
        assert!(boosted_peak > bypassed_peak * 2.0);
    }

    #[test]
    fn test_boost_increases_amplitude() {
        let mut eq = Equalizer::new(48000.0).unwrap();
        let flat_peak = sine_peak(&mut eq, 1000.0, 48000.0);

        let mut snapshot = EqSnapshot::default();
        snapshot.bands[5].gain_db = 12.0;
        eq.apply_snapshot(&snapshot);
        eq.reset();
        let boosted_peak = sine_peak(&mut eq, 1000.0, 48000.0);

        assert!(boosted_peak > flat_peak, "Boost should increase amplitude");
    }

    #[test]
    fn test_master_gain_scales_output() {
        let mut eq = Equalizer::new(48000.0).unwrap();
        let mut snapshot = EqSnapshot::default();
        for band in snapshot.bands.iter_mut() {
            band.bypass = true;
        }
        snapshot.master_gain = 2.0;
        eq.apply_snapshot(&snapshot);

        let (l, r) = eq.process_sample(0.25, -0.25);
        assert_eq!(l, 0.5);
        assert_eq!(r, -0.5);
    }

    #[test]
    fn test_interleaved_mono_and_multichannel() {
        let mut eq = Equalizer::new(48000.0).unwrap();
        let mut snapshot = EqSnapshot::default();
        for band in snapshot.bands.iter_mut() {
            band.bypass = true;
        }
        snapshot.master_gain = 0.5;
        eq.apply_snapshot(&snapshot);

        let mut mono = vec![1.0, -1.0];
        eq.process_interleaved(&mut mono, 1);
        assert_eq!(mono, vec![0.5, -0.5]);

        let mut quad = vec![1.0, 1.0, 1.0, 1.0];
        eq.process_interleaved(&mut quad, 4);
        assert_eq!(quad, vec![0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_every_shape_is_stable() {
        for shape in FilterShape::ALL {
            let mut eq = Equalizer::new(48000.0).unwrap();
            let mut snapshot = EqSnapshot::default();
            for band in snapshot.bands.iter_mut() {
                band.shape = shape;
                band.gain_db = 6.0;
            }
            eq.apply_snapshot(&snapshot);
            let peak = sine_peak(&mut eq, 440.0, 48000.0);
            assert!(peak.is_finite(), "{shape} produced non-finite output");
        }
    }

    #[test]
    fn test_reset_doesnt_panic() {
        let mut eq = Equalizer::new(48000.0).unwrap();
        for _ in 0..100 {
            eq.process_sample(0.5, -0.5);
        }
        eq.reset();
        let (l, r) = eq.process_sample(0.5, -0.5);
        assert!(l.is_finite());
        assert!(r.is_finite());
    }
}
