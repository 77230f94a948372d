//! Source Ingestion
//!
//! File reference in, frame count / sample rate / decoded samples out.
//! WAV only, decoded through `hound`.

use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

/// What ingestion learned about a source without decoding it
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub frames: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl SourceInfo {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }

    /// File stem, used as the display title
    pub fn title(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Decoded, interleaved, normalized samples
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBuffer {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl SourceBuffer {
    /// Trailing samples that don't make up a whole frame are dropped
    pub fn from_interleaved(mut samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels;
        samples.truncate(whole);
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> u64 {
        (self.samples.len() / self.channels) as u64
    }

    /// Sample at `frame` for channel `channel`, folding extra output
    /// channels onto the last source channel
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let ch = channel.min(self.channels - 1);
        self.samples
            .get(frame * self.channels + ch)
            .copied()
            .unwrap_or(0.0)
    }
}

fn open_error(path: &Path, err: impl ToString) -> CoreError {
    let err = CoreError::SourceOpen {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };
    warn!("{}", err);
    err
}

/// Read the header only
pub fn probe(path: impl AsRef<Path>) -> CoreResult<SourceInfo> {
    let path = path.as_ref();
    let reader = WavReader::open(path).map_err(|e| open_error(path, e))?;
    let spec = reader.spec();
    Ok(SourceInfo {
        path: path.to_path_buf(),
        frames: u64::from(reader.duration()),
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Open and fully decode a source
pub fn open_source(path: impl AsRef<Path>) -> CoreResult<(SourceInfo, SourceBuffer)> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path).map_err(|e| open_error(path, e))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| open_error(path, e))?,
        SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(|e| open_error(path, e))?
        }
    };

    let buffer = SourceBuffer::from_interleaved(samples, spec.channels as usize, spec.sample_rate);
    let info = SourceInfo {
        path: path.to_path_buf(),
        frames: buffer.frames(),
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    };
    debug!(
        "Opened {:?}: {} frames @ {} Hz, {} ch",
        path, info.frames, info.sample_rate, info.channels
    );
    Ok((info, buffer))
}
