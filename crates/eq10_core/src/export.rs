//! Export Pipeline
//!
//! Writes a uniquely named, timestamped copy of a source into the scratch
//! directory: a plain file copy for lossless, or 16-bit PCM streamed through
//! a bitrate-configured MP3 encoder for the lossy formats.
//!
//! File name: `{timestamp}_eq10[_{bitrate}k].{ext}`

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use crossbeam_channel::Sender;
use mp3lame_encoder::{max_required_buffer_size, Bitrate, Builder, DualPcm, Encoder, FlushNoGap, Quality};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ExportConfig;
use crate::error::{CoreError, CoreResult};
use crate::message::WorkerEvent;
use crate::source::{open_source, SourceBuffer};

/// Frames handed to the encoder per call
const ENCODE_CHUNK_FRAMES: usize = 4096;

/// Extra room LAME may need when flushing
const FLUSH_RESERVE: usize = 7200;

const APP_TAG: &str = "eq10";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Lossless,
    LossyHigh,
    LossyLow,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [
        ExportFormat::Lossless,
        ExportFormat::LossyHigh,
        ExportFormat::LossyLow,
    ];

    /// `None` for lossless
    pub fn bitrate_kbps(self, config: &ExportConfig) -> Option<u32> {
        match self {
            ExportFormat::Lossless => None,
            ExportFormat::LossyHigh => Some(config.high_kbps),
            ExportFormat::LossyLow => Some(config.low_kbps),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Lossless => "lossless",
            ExportFormat::LossyHigh => "lossy-high",
            ExportFormat::LossyLow => "lossy-low",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lossless" | "wav" => Ok(ExportFormat::Lossless),
            "lossy-high" | "high" => Ok(ExportFormat::LossyHigh),
            "lossy-low" | "low" => Ok(ExportFormat::LossyLow),
            other => Err(CoreError::ConfigError(format!("unknown export format '{}'", other))),
        }
    }
}

/// `{timestamp}_eq10[_{kbps}k].{ext}`
pub fn export_file_name(
    now: DateTime<Local>,
    format: ExportFormat,
    config: &ExportConfig,
    lossless_ext: &str,
) -> String {
    let stamp = now.format("%Y%m%d_%H%M%S_%3f");
    match format.bitrate_kbps(config) {
        Some(kbps) => format!("{}_{}_{}k.mp3", stamp, APP_TAG, kbps),
        None => format!("{}_{}.{}", stamp, APP_TAG, lossless_ext),
    }
}

/// Float samples to interleaved 16-bit PCM. Non-finite samples become
/// silence; out-of-range samples saturate.
pub fn pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            if !s.is_finite() {
                return 0;
            }
            (s * i16::MAX as f32)
                .round()
                .clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect()
}

/// Streaming encoder: header, any number of bodies, then flush
pub trait StreamEncoder {
    fn write_header(&mut self, out: &mut dyn Write) -> CoreResult<u64>;

    /// `pcm` is interleaved with the channel count the encoder was built for
    fn encode(&mut self, pcm: &[i16], out: &mut dyn Write) -> CoreResult<u64>;

    fn flush(&mut self, out: &mut dyn Write) -> CoreResult<u64>;
}

/// MP3 via LAME. Always encodes stereo; mono sources are duplicated and
/// channels past the second are dropped.
pub struct LameEncoder {
    encoder: Encoder,
    channels: usize,
    left: Vec<i16>,
    right: Vec<i16>,
    out: Vec<u8>,
}

impl LameEncoder {
    pub fn new(channels: u16, sample_rate: u32, kbps: u32) -> CoreResult<Self> {
        let lame_err = |what: &str, e: &dyn fmt::Debug| {
            CoreError::Encoding(format!("LAME {} failed: {:?}", what, e))
        };

        let mut builder =
            Builder::new().ok_or_else(|| CoreError::Encoding("LAME encoder init failed".into()))?;
        builder
            .set_num_channels(2)
            .map_err(|e| lame_err("set channels", &e))?;
        builder
            .set_sample_rate(sample_rate)
            .map_err(|e| lame_err("set sample rate", &e))?;
        builder
            .set_brate(lame_bitrate(kbps))
            .map_err(|e| lame_err("set bitrate", &e))?;
        builder
            .set_quality(Quality::Best)
            .map_err(|e| lame_err("set quality", &e))?;
        let encoder = builder.build().map_err(|e| lame_err("build", &e))?;

        Ok(Self {
            encoder,
            channels: channels.max(1) as usize,
            left: Vec::new(),
            right: Vec::new(),
            out: Vec::new(),
        })
    }
}

fn lame_bitrate(kbps: u32) -> Bitrate {
    match kbps {
        0..=111 => Bitrate::Kbps96,
        112..=127 => Bitrate::Kbps112,
        128..=159 => Bitrate::Kbps128,
        160..=191 => Bitrate::Kbps160,
        192..=223 => Bitrate::Kbps192,
        224..=255 => Bitrate::Kbps224,
        256..=319 => Bitrate::Kbps256,
        _ => Bitrate::Kbps320,
    }
}

/// Minimal ID3v2.3 tag carrying the encoder name (TSSE)
fn id3_tag() -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(b"TSSE");
    frame.extend_from_slice(&((APP_TAG.len() + 1) as u32).to_be_bytes());
    frame.extend_from_slice(&[0, 0]); // frame flags
    frame.push(0); // ISO-8859-1
    frame.extend_from_slice(APP_TAG.as_bytes());

    // Tag size is synchsafe: 7 bits per byte
    let size = frame.len() as u32;
    let mut tag = Vec::with_capacity(10 + frame.len());
    tag.extend_from_slice(b"ID3");
    tag.extend_from_slice(&[3, 0, 0]);
    tag.extend_from_slice(&[
        ((size >> 21) & 0x7F) as u8,
        ((size >> 14) & 0x7F) as u8,
        ((size >> 7) & 0x7F) as u8,
        (size & 0x7F) as u8,
    ]);
    tag.extend_from_slice(&frame);
    tag
}

impl StreamEncoder for LameEncoder {
    fn write_header(&mut self, out: &mut dyn Write) -> CoreResult<u64> {
        let tag = id3_tag();
        out.write_all(&tag)?;
        Ok(tag.len() as u64)
    }

    fn encode(&mut self, pcm: &[i16], out: &mut dyn Write) -> CoreResult<u64> {
        self.left.clear();
        self.right.clear();
        for frame in pcm.chunks_exact(self.channels) {
            self.left.push(frame[0]);
            self.right.push(*frame.get(1).unwrap_or(&frame[0]));
        }
        if self.left.is_empty() {
            return Ok(0);
        }

        self.out.clear();
        self.out.reserve(max_required_buffer_size(self.left.len()));
        let input = DualPcm {
            left: &self.left,
            right: &self.right,
        };
        let encoded = self
            .encoder
            .encode(input, self.out.spare_capacity_mut())
            .map_err(|e| CoreError::Encoding(format!("LAME encode failed: {:?}", e)))?;
        // SAFETY: encoder wrote `encoded` bytes into spare capacity
        unsafe {
            self.out.set_len(encoded);
        }
        out.write_all(&self.out)?;
        Ok(encoded as u64)
    }

    fn flush(&mut self, out: &mut dyn Write) -> CoreResult<u64> {
        self.out.clear();
        self.out.reserve(FLUSH_RESERVE);
        let flushed = self
            .encoder
            .flush::<FlushNoGap>(self.out.spare_capacity_mut())
            .map_err(|e| CoreError::Encoding(format!("LAME flush failed: {:?}", e)))?;
        // SAFETY: encoder wrote `flushed` bytes into spare capacity
        unsafe {
            self.out.set_len(flushed);
        }
        out.write_all(&self.out)?;
        Ok(flushed as u64)
    }
}

/// Stream `buffer` through `encoder` into `path`, then check the file on
/// disk holds exactly what was written. Returns the byte count.
pub fn encode_to(
    path: &Path,
    buffer: &SourceBuffer,
    encoder: &mut dyn StreamEncoder,
) -> CoreResult<u64> {
    let mut out = BufWriter::new(File::create(path)?);
    let mut written = encoder.write_header(&mut out)?;
    for chunk in buffer
        .samples()
        .chunks(ENCODE_CHUNK_FRAMES * buffer.channels())
    {
        written += encoder.encode(&pcm16(chunk), &mut out)?;
    }
    written += encoder.flush(&mut out)?;
    out.flush()?;
    drop(out);

    verify_output(path, written)?;
    Ok(written)
}

/// Output must be non-empty and exactly `expected` bytes long
pub fn verify_output(path: &Path, expected: u64) -> CoreResult<()> {
    let found = fs::metadata(path)?.len();
    if found == 0 {
        return Err(CoreError::Encoding(format!("{:?} is empty", path)));
    }
    if found != expected {
        return Err(CoreError::TruncatedOutput { expected, found });
    }
    Ok(())
}

/// Runs export requests against one scratch directory
#[derive(Debug, Clone)]
pub struct Exporter {
    config: ExportConfig,
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Fresh path in the scratch directory; a numeric suffix is added if a
    /// file with the same timestamp already exists
    pub fn output_path(&self, source: &Path, format: ExportFormat, now: DateTime<Local>) -> PathBuf {
        let dir = self.config.scratch_dir();
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("wav");
        let name = export_file_name(now, format, &self.config, ext);
        let mut path = dir.join(&name);
        let mut n = 1;
        while path.exists() {
            let (stem, ext) = name.rsplit_once('.').unwrap_or((name.as_str(), ""));
            path = dir.join(format!("{}-{}.{}", stem, n, ext));
            n += 1;
        }
        path
    }

    /// Export `source` in `format`. On failure nothing is left behind.
    pub fn export(&self, source: &Path, format: ExportFormat) -> CoreResult<PathBuf> {
        fs::create_dir_all(self.config.scratch_dir())?;
        let path = self.output_path(source, format, Local::now());

        let result = match format.bitrate_kbps(&self.config) {
            None => fs::copy(source, &path)
                .map_err(CoreError::from)
                .and_then(|copied| verify_output(&path, copied)),
            Some(kbps) => open_source(source).and_then(|(info, buffer)| {
                let mut encoder = LameEncoder::new(info.channels, info.sample_rate, kbps)?;
                encode_to(&path, &buffer, &mut encoder).map(|_| ())
            }),
        };

        match result {
            Ok(()) => {
                info!("Exported {:?} as {} to {:?}", source, format, path);
                Ok(path)
            }
            Err(e) => {
                warn!("Export of {:?} as {} failed: {}", source, format, e);
                if path.exists() {
                    let _ = fs::remove_file(&path);
                }
                Err(e)
            }
        }
    }
}

/// Run an export on a worker and post the outcome
pub fn spawn_export(
    exporter: Exporter,
    source: PathBuf,
    format: ExportFormat,
    events: Sender<WorkerEvent>,
) -> CoreResult<JoinHandle<()>> {
    thread::Builder::new()
        .name("eq10-export".into())
        .spawn(move || {
            debug!("Export worker started for {:?}", source);
            let result = exporter.export(&source, format);
            let _ = events.send(WorkerEvent::ExportFinished { format, result });
        })
        .map_err(CoreError::Io)
}
