//! Level Meter
//!
//! Short-window loudness of rendered blocks and the LED ladder that maps a
//! loudness value to lit, colored segments.
//!
//! The accumulator half ([`LevelMeter`]) runs inside the audio callback and
//! never allocates. The ladder half runs on the UI side.

/// Added to the RMS before taking the log so silence stays finite
pub const LOUDNESS_EPSILON: f64 = 1e-12;

/// Lowest cut point of the LED ladder (dB)
pub const METER_FLOOR_DB: f32 = -64.0;

/// Root-mean-square of a block. Empty blocks read as silence.
pub fn rms(block: &[f32]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum: f64 = block.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / block.len() as f64).sqrt() as f32
}

/// Loudness of a block in dB: `20 * log10(rms + 1e-12)`
pub fn loudness_db(block: &[f32]) -> f32 {
    rms_to_db(f64::from(rms(block)))
}

fn rms_to_db(rms: f64) -> f32 {
    (20.0 * (rms + LOUDNESS_EPSILON).log10()) as f32
}

/// Streaming RMS accumulator for the real-time path.
///
/// Feed samples with [`push`](Self::push) and call
/// [`finish`](Self::finish) once per block.
#[derive(Debug, Default, Clone, Copy)]
pub struct LevelMeter {
    sum_squares: f64,
    count: usize,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, sample: f32) {
        let s = f64::from(sample);
        self.sum_squares += s * s;
        self.count += 1;
    }

    /// Loudness of everything pushed since the last call, then reset.
    /// Returns `None` when no samples were pushed.
    #[inline]
    pub fn finish(&mut self) -> Option<f32> {
        if self.count == 0 {
            return None;
        }
        let rms = (self.sum_squares / self.count as f64).sqrt();
        self.sum_squares = 0.0;
        self.count = 0;
        Some(rms_to_db(rms))
    }
}

/// Linear RGB in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        Rgb {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
        }
    }
}

pub const RED: Rgb = Rgb::new(1.0, 0.15, 0.1);
pub const YELLOW: Rgb = Rgb::new(1.0, 0.85, 0.0);
pub const GREEN: Rgb = Rgb::new(0.1, 0.9, 0.3);

/// Cut point of the ladder with the color assigned to it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub floor_db: f32,
    pub color: Rgb,
}

/// One LED of the ladder as the UI should draw it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedSegment {
    pub floor_db: f32,
    pub color: Rgb,
    pub lit: bool,
}

/// Multi-threshold LED meter.
///
/// Thresholds run from 0 dB down to [`METER_FLOOR_DB`]. Each threshold may
/// carry its own color; thresholds with `None` take a color blended linearly
/// between the nearest colored neighbours above and below.
#[derive(Debug, Clone)]
pub struct LedLadder {
    thresholds: Vec<Threshold>,
}

impl LedLadder {
    /// Build a ladder from `(floor_db, color)` cut points.
    ///
    /// Points are sorted from loudest to quietest. Uncolored points are
    /// filled by blending their colored neighbours.
    pub fn new(points: &[(f32, Option<Rgb>)]) -> Self {
        let mut points: Vec<(f32, Option<Rgb>)> = points.to_vec();
        points.sort_by(|a, b| b.0.total_cmp(&a.0));

        let thresholds = points
            .iter()
            .enumerate()
            .map(|(i, &(floor_db, color))| {
                let color = color.unwrap_or_else(|| blend_at(&points, i));
                Threshold { floor_db, color }
            })
            .collect();

        Self { thresholds }
    }

    /// 0 dB clip LED in red, yellow warning zone, green body down to -64 dB
    pub fn standard() -> Self {
        Self::new(&[
            (0.0, Some(RED)),
            (-3.0, None),
            (-6.0, Some(YELLOW)),
            (-9.0, None),
            (-12.0, None),
            (-18.0, Some(GREEN)),
            (-24.0, None),
            (-32.0, None),
            (-40.0, None),
            (-48.0, None),
            (-56.0, None),
            (METER_FLOOR_DB, Some(GREEN)),
        ])
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    /// Number of segments lit for `level_db`
    pub fn lit_count(&self, level_db: f32) -> usize {
        self.thresholds
            .iter()
            .filter(|t| level_db > t.floor_db)
            .count()
    }

    /// Segments from loudest to quietest, lit when the level exceeds the floor
    pub fn segments(&self, level_db: f32) -> Vec<LedSegment> {
        self.thresholds
            .iter()
            .map(|t| LedSegment {
                floor_db: t.floor_db,
                color: t.color,
                lit: level_db > t.floor_db,
            })
            .collect()
    }
}

fn blend_at(points: &[(f32, Option<Rgb>)], index: usize) -> Rgb {
    let above = points[..index]
        .iter()
        .rev()
        .find_map(|&(db, c)| c.map(|c| (db, c)));
    let below = points[index + 1..]
        .iter()
        .find_map(|&(db, c)| c.map(|c| (db, c)));
    let db = points[index].0;

    match (above, below) {
        (Some((hi_db, hi)), Some((lo_db, lo))) => {
            if hi == lo || hi_db == lo_db {
                hi
            } else {
                hi.lerp(lo, (hi_db - db) / (hi_db - lo_db))
            }
        }
        (Some((_, c)), None) | (None, Some((_, c))) => c,
        (None, None) => GREEN,
    }
}
