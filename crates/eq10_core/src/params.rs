//! Parameter Store
//!
//! Single-writer owner of band settings, master gain and the preset library.
//! Lives on the controller context; the rendering context only ever sees
//! [`EqSnapshot`] copies produced by [`ParameterStore::snapshot`].

use eq10_dsp::{
    BuiltinPreset, EqSnapshot, EqualizerBand, FilterShape, BAND_COUNT, BAND_LABELS,
    MAX_MASTER_GAIN, PRESETS,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Named gain/shape vector. Immutable once created; edits replace it.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualizerPreset {
    id: Uuid,
    name: String,
    gains: [f32; BAND_COUNT],
    shapes: Option<[FilterShape; BAND_COUNT]>,
}

impl EqualizerPreset {
    pub fn new(
        name: impl Into<String>,
        gains: [f32; BAND_COUNT],
        shapes: Option<[FilterShape; BAND_COUNT]>,
    ) -> CoreResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::EmptyPresetName);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            gains,
            shapes,
        })
    }

    /// Build from variable-length vectors, as read back from storage
    pub fn from_parts(
        name: impl Into<String>,
        gains: &[f32],
        shapes: Option<&[FilterShape]>,
    ) -> CoreResult<Self> {
        let gains: [f32; BAND_COUNT] = gains.try_into().map_err(|_| {
            CoreError::InvalidPreset(format!("expected {} gains, got {}", BAND_COUNT, gains.len()))
        })?;
        let shapes = match shapes {
            Some(shapes) => Some(<[FilterShape; BAND_COUNT]>::try_from(shapes).map_err(|_| {
                CoreError::InvalidPreset(format!(
                    "expected {} shapes, got {}",
                    BAND_COUNT,
                    shapes.len()
                ))
            })?),
            None => None,
        };
        Self::new(name, gains, shapes)
    }

    fn from_builtin(index: usize, builtin: &BuiltinPreset) -> Self {
        Self {
            // Stable ids so built-ins compare equal across runs
            id: Uuid::from_u128(index as u128 + 1),
            name: builtin.name.to_string(),
            gains: builtin.gains,
            shapes: builtin.shapes,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gains(&self) -> &[f32; BAND_COUNT] {
        &self.gains
    }

    pub fn shapes(&self) -> Option<&[FilterShape; BAND_COUNT]> {
        self.shapes.as_ref()
    }

    /// Shape for band `index`; parametric when the preset carries no shapes
    pub fn shape(&self, index: usize) -> FilterShape {
        self.shapes
            .as_ref()
            .and_then(|s| s.get(index).copied())
            .unwrap_or(FilterShape::Parametric)
    }
}

/// All factory presets, in table order
pub fn builtin_presets() -> Vec<EqualizerPreset> {
    PRESETS
        .iter()
        .enumerate()
        .map(|(i, p)| EqualizerPreset::from_builtin(i, p))
        .collect()
}

/// Owner of the live equalizer parameters
#[derive(Debug, Clone)]
pub struct ParameterStore {
    pub(crate) bands: [EqualizerBand; BAND_COUNT],
    master_gain: f32,
    user_presets: Vec<EqualizerPreset>,
    active_preset: Option<String>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterStore {
    pub fn new() -> Self {
        let defaults = EqSnapshot::default();
        Self {
            bands: defaults.bands,
            master_gain: defaults.master_gain,
            user_presets: Vec::new(),
            active_preset: None,
        }
    }

    pub fn bands(&self) -> &[EqualizerBand; BAND_COUNT] {
        &self.bands
    }

    pub fn band(&self, index: usize) -> Option<&EqualizerBand> {
        self.bands.get(index)
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// Linear master gain, clamped to [0, 2]
    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = if gain.is_finite() {
            gain.clamp(0.0, MAX_MASTER_GAIN)
        } else {
            1.0
        };
    }

    /// Copy handed to the rendering context
    pub fn snapshot(&self) -> EqSnapshot {
        EqSnapshot {
            bands: self.bands,
            master_gain: self.master_gain,
        }
    }

    /// Overwrite band gain/shape/bypass from a stored session.
    /// Frequencies stay fixed.
    pub fn restore_bands(
        &mut self,
        gains: &[f32; BAND_COUNT],
        shapes: &[FilterShape; BAND_COUNT],
        bypass: &[bool; BAND_COUNT],
    ) {
        for (i, band) in self.bands.iter_mut().enumerate() {
            band.gain_db = gains[i];
            band.shape = shapes[i];
            band.bypass = bypass[i];
        }
    }

    // Display values

    pub fn band_label(&self, index: usize) -> Option<&'static str> {
        BAND_LABELS.get(index).copied()
    }

    /// e.g. "+6.0 dB", "-40.0 dB", "0.0 dB"; "off" for bypassed bands
    pub fn gain_text(&self, index: usize) -> Option<String> {
        let band = self.bands.get(index)?;
        if band.bypass {
            return Some("off".to_string());
        }
        Some(if band.gain_db > 0.0 {
            format!("+{:.1} dB", band.gain_db)
        } else {
            format!("{:.1} dB", band.gain_db)
        })
    }

    /// Master gain as a percentage, e.g. "100%"
    pub fn master_gain_text(&self) -> String {
        format!("{:.0}%", self.master_gain * 100.0)
    }

    // Preset library

    pub fn user_presets(&self) -> &[EqualizerPreset] {
        &self.user_presets
    }

    /// Built-in presets followed by user presets
    pub fn all_presets(&self) -> Vec<EqualizerPreset> {
        let mut all = builtin_presets();
        all.extend(self.user_presets.iter().cloned());
        all
    }

    /// Find a preset by name, user presets shadowing built-ins
    pub fn find_preset(&self, name: &str) -> Option<EqualizerPreset> {
        self.user_presets
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .cloned()
            .or_else(|| {
                builtin_presets()
                    .into_iter()
                    .find(|p| p.name().eq_ignore_ascii_case(name))
            })
    }

    /// Save the current band state under `name`.
    ///
    /// An existing user preset with the same name is replaced wholesale.
    pub fn save_user_preset(&mut self, name: &str) -> CoreResult<EqualizerPreset> {
        let gains = core::array::from_fn(|i| self.bands[i].gain_db);
        let shapes = core::array::from_fn(|i| self.bands[i].shape);
        let preset = EqualizerPreset::new(name.trim(), gains, Some(shapes))?;
        self.insert_user_preset(preset.clone());
        info!("Saved user preset '{}'", preset.name());
        Ok(preset)
    }

    /// Add or replace (by name) a user preset
    pub fn insert_user_preset(&mut self, preset: EqualizerPreset) {
        match self
            .user_presets
            .iter_mut()
            .find(|p| p.name().eq_ignore_ascii_case(preset.name()))
        {
            Some(existing) => *existing = preset,
            None => self.user_presets.push(preset),
        }
    }

    pub fn delete_user_preset(&mut self, id: Uuid) -> CoreResult<()> {
        let before = self.user_presets.len();
        self.user_presets.retain(|p| p.id() != id);
        if self.user_presets.len() == before {
            return Err(CoreError::PresetNotFound(id.to_string()));
        }
        debug!("Deleted user preset {}", id);
        Ok(())
    }

    pub fn replace_user_presets(&mut self, presets: Vec<EqualizerPreset>) {
        self.user_presets = presets;
    }

    pub fn active_preset(&self) -> Option<&str> {
        self.active_preset.as_deref()
    }

    pub fn set_active_preset(&mut self, name: Option<String>) {
        self.active_preset = name;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store_is_flat() {
        let store = ParameterStore::new();
        assert!(store.bands().iter().all(|b| b.gain_db == 0.0 && !b.bypass));
        assert_eq!(store.bands()[0].shape, FilterShape::LowShelf);
        assert_eq!(store.bands()[9].shape, FilterShape::HighShelf);
        assert_eq!(store.master_gain(), 1.0);
    }

    #[test]
    fn test_master_gain_clamped() {
        let mut store = ParameterStore::new();
        store.set_master_gain(3.0);
        assert_eq!(store.master_gain(), 2.0);
        store.set_master_gain(-1.0);
        assert_eq!(store.master_gain(), 0.0);
        store.set_master_gain(f32::NAN);
        assert_eq!(store.master_gain(), 1.0);
    }

    #[test]
    fn test_snapshot_copies_state() {
        let mut store = ParameterStore::new();
        store.bands[3].gain_db = 7.0;
        store.set_master_gain(0.5);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.bands[3].gain_db, 7.0);
        assert_eq!(snapshot.master_gain, 0.5);

        // Later edits don't leak into an existing snapshot
        store.bands[3].gain_db = -7.0;
        assert_eq!(snapshot.bands[3].gain_db, 7.0);
    }

    #[test]
    fn test_display_values() {
        let mut store = ParameterStore::new();
        store.bands[0].gain_db = 6.0;
        store.bands[1].gain_db = -40.0;
        store.bands[2].bypass = true;

        assert_eq!(store.band_label(5), Some("1K"));
        assert_eq!(store.band_label(10), None);
        assert_eq!(store.gain_text(0).unwrap(), "+6.0 dB");
        assert_eq!(store.gain_text(1).unwrap(), "-40.0 dB");
        assert_eq!(store.gain_text(2).unwrap(), "off");
        assert_eq!(store.gain_text(3).unwrap(), "0.0 dB");
        assert_eq!(store.master_gain_text(), "100%");
    }

    #[test]
    fn test_empty_preset_name_rejected() {
        let mut store = ParameterStore::new();
        assert!(matches!(
            store.save_user_preset("   "),
            Err(CoreError::EmptyPresetName)
        ));
        assert!(store.user_presets().is_empty());
    }

    #[test]
    fn test_save_replaces_same_name() {
        let mut store = ParameterStore::new();
        store.bands[0].gain_db = 3.0;
        let first = store.save_user_preset("Mine").unwrap();
        store.bands[0].gain_db = 9.0;
        let second = store.save_user_preset("mine").unwrap();

        assert_eq!(store.user_presets().len(), 1);
        assert_ne!(first.id(), second.id());
        assert_eq!(store.user_presets()[0].gains()[0], 9.0);
    }

    #[test]
    fn test_delete_user_preset() {
        let mut store = ParameterStore::new();
        let preset = store.save_user_preset("Temp").unwrap();
        assert!(store.delete_user_preset(preset.id()).is_ok());
        assert!(store.delete_user_preset(preset.id()).is_err());
    }

    #[test]
    fn test_from_parts_checks_lengths() {
        assert!(EqualizerPreset::from_parts("ok", &[0.0; 10], None).is_ok());
        assert!(matches!(
            EqualizerPreset::from_parts("short", &[0.0; 9], None),
            Err(CoreError::InvalidPreset(_))
        ));
        assert!(EqualizerPreset::from_parts(
            "shapes",
            &[0.0; 10],
            Some(&[FilterShape::Parametric; 3])
        )
        .is_err());
    }

    #[test]
    fn test_missing_shapes_mean_parametric() {
        let preset = EqualizerPreset::new("p", [0.0; 10], None).unwrap();
        for i in 0..BAND_COUNT {
            assert_eq!(preset.shape(i), FilterShape::Parametric);
        }
    }

    #[test]
    fn test_find_preset_user_shadows_builtin() {
        let mut store = ParameterStore::new();
        assert_eq!(store.find_preset("flat").unwrap().id(), Uuid::from_u128(1));

        store.bands[4].gain_db = 2.0;
        store.save_user_preset("Flat").unwrap();
        let found = store.find_preset("Flat").unwrap();
        assert_eq!(found.gains()[4], 2.0);
        assert_eq!(store.all_presets().len(), PRESETS.len() + 1);
    }
}
