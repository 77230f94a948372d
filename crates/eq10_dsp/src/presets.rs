//! Built-in EQ Presets

use crate::eq::{FilterShape, BAND_COUNT};

use crate::eq::FilterShape::{BandPass as BP, HighShelf as HS, LowShelf as LS, Parametric as P};

/// Factory preset: name, 10 band gains and an optional shape per band
/// (absent means every band is parametric)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuiltinPreset {
    pub name: &'static str,
    pub gains: [f32; BAND_COUNT],
    pub shapes: Option<[FilterShape; BAND_COUNT]>,
}

/// List of built-in presets
pub const PRESETS: &[BuiltinPreset] = &[
    BuiltinPreset {
        name: "Flat",
        gains: [0.0; BAND_COUNT],
        shapes: None,
    },
    BuiltinPreset {
        name: "Bass Boost",
        gains: [6.0, 5.0, 3.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        shapes: Some([LS, P, P, P, P, P, P, P, P, HS]),
    },
    BuiltinPreset {
        name: "Treble Boost",
        gains: [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 3.0, 5.0, 6.0, 6.0],
        shapes: Some([LS, P, P, P, P, P, P, P, P, HS]),
    },
    BuiltinPreset {
        name: "Vocal Clarity",
        gains: [-2.0, -1.0, 0.0, 2.0, 4.0, 4.0, 3.0, 2.0, 1.0, 0.0],
        shapes: None,
    },
    BuiltinPreset {
        name: "Loudness",
        gains: [4.0, 3.0, 0.0, -1.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0],
        shapes: Some([LS, P, P, P, P, P, P, P, P, HS]),
    },
    BuiltinPreset {
        name: "Electronic",
        gains: [4.0, 3.0, 1.0, 0.0, -2.0, -2.0, 0.0, 1.0, 3.0, 4.0],
        shapes: None,
    },
    // Narrow mid band, everything else carved away
    BuiltinPreset {
        name: "Telephone",
        gains: [-40.0, -40.0, -20.0, 0.0, 6.0, 6.0, 0.0, -20.0, -40.0, -40.0],
        shapes: Some([P, P, P, P, BP, BP, P, P, P, P]),
    },
];

/// Look up a built-in preset by name (case-insensitive)
pub fn find_preset(name: &str) -> Option<&'static BuiltinPreset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}
