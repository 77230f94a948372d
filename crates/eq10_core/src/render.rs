//! Render Graph Hand-off
//!
//! The controller talks to the rendering context through [`RenderGraph`].
//! The production implementation is a pair of lock-free rings:
//!
//! ```text
//! RenderHandle ──commands (rtrb)──▶ Renderer (audio callback)
//!      ▲                               │
//!      └──────feedback (rtrb)──────────┤   level, segment finished
//!      └──────retired sources (rtrb)───┤   old buffers freed off the callback
//!      └──────clock (AtomicU64)────────┘   generation + frames played
//! ```
//!
//! The renderer never blocks, locks, logs or frees memory. Its equalizer
//! runs at the output device rate for the life of the stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use eq10_dsp::{EqSnapshot, Equalizer, LevelMeter};
use rtrb::{Consumer, Producer, PushError, RingBuffer};
use tracing::warn;

use crate::error::CoreResult;
use crate::source::SourceBuffer;

const FRAME_BITS: u32 = 48;
const FRAME_MASK: u64 = (1 << FRAME_BITS) - 1;
const GENERATION_MASK: u64 = 0xFFFF;

#[inline]
fn pack(generation: u64, frames: u64) -> u64 {
    ((generation & GENERATION_MASK) << FRAME_BITS) | (frames & FRAME_MASK)
}

#[inline]
fn unpack(clock: u64) -> (u64, u64) {
    (clock >> FRAME_BITS, clock & FRAME_MASK)
}

/// A contiguous run of source frames to play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start_frame: u64,
    pub frames: u64,
    /// Tag echoed back in [`RenderFeedback::SegmentFinished`]
    pub generation: u64,
}

/// Values the rendering context posts back to the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderFeedback {
    /// Loudness of the last rendered block, first channel, in dB
    Level(f32),
    /// The scheduled segment played to its end
    SegmentFinished { generation: u64 },
}

/// Controller-side view of the audio rendering graph
pub trait RenderGraph {
    /// Output rate; sources must match it
    fn sample_rate(&self) -> u32;

    /// Replace the active source
    fn load(&mut self, source: Arc<SourceBuffer>);

    /// Queue a segment, replacing any segment not yet finished
    fn schedule(&mut self, segment: Segment);

    fn play(&mut self);

    /// Stop rendering and drop the scheduled segment
    fn stop(&mut self);

    /// Frames rendered from the current segment, `None` when nothing is
    /// scheduled
    fn sample_time(&self) -> Option<u64>;

    /// Hand a new parameter snapshot to the renderer
    fn publish(&mut self, snapshot: EqSnapshot);

    /// Next value posted by the rendering context
    fn poll(&mut self) -> Option<RenderFeedback>;
}

enum RenderCommand {
    Load(Arc<SourceBuffer>),
    Schedule(Segment),
    Play,
    Stop,
    Snapshot(EqSnapshot),
}

/// Create the controller handle and the renderer that goes into the audio
/// callback. `capacity` sizes every ring.
pub fn render_channel(capacity: usize, sample_rate: u32) -> CoreResult<(RenderHandle, Renderer)> {
    let (command_tx, command_rx) = RingBuffer::new(capacity);
    let (feedback_tx, feedback_rx) = RingBuffer::new(capacity);
    let (retired_tx, retired_rx) = RingBuffer::new(capacity);
    let clock = Arc::new(AtomicU64::new(0));

    let handle = RenderHandle {
        commands: command_tx,
        feedback: feedback_rx,
        retired: retired_rx,
        clock: Arc::clone(&clock),
        scheduled: None,
        sample_rate,
    };
    let renderer = Renderer {
        commands: command_rx,
        feedback: feedback_tx,
        retired: retired_tx,
        clock,
        eq: Equalizer::new(sample_rate as f32)?,
        meter: LevelMeter::new(),
        source: None,
        retiring: None,
        segment: None,
        played: 0,
        playing: false,
    };
    Ok((handle, renderer))
}

/// Controller end of the render rings
pub struct RenderHandle {
    commands: Producer<RenderCommand>,
    feedback: Consumer<RenderFeedback>,
    retired: Consumer<Arc<SourceBuffer>>,
    clock: Arc<AtomicU64>,
    scheduled: Option<u64>,
    sample_rate: u32,
}

impl RenderHandle {
    fn send(&mut self, command: RenderCommand) {
        if self.commands.push(command).is_err() {
            warn!("Render command ring full, command dropped");
        }
    }

    /// Free source buffers the renderer has let go of
    fn collect_retired(&mut self) {
        while let Ok(old) = self.retired.pop() {
            drop(old);
        }
    }
}

impl RenderGraph for RenderHandle {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn load(&mut self, source: Arc<SourceBuffer>) {
        self.collect_retired();
        self.send(RenderCommand::Load(source));
    }

    fn schedule(&mut self, segment: Segment) {
        self.scheduled = Some(segment.generation);
        self.send(RenderCommand::Schedule(segment));
    }

    fn play(&mut self) {
        self.send(RenderCommand::Play);
    }

    fn stop(&mut self) {
        self.scheduled = None;
        self.send(RenderCommand::Stop);
    }

    fn sample_time(&self) -> Option<u64> {
        let generation = self.scheduled?;
        let (clock_generation, frames) = unpack(self.clock.load(Ordering::Acquire));
        // Renderer hasn't picked the segment up yet
        if clock_generation != generation & GENERATION_MASK {
            return Some(0);
        }
        Some(frames)
    }

    fn publish(&mut self, snapshot: EqSnapshot) {
        self.send(RenderCommand::Snapshot(snapshot));
    }

    fn poll(&mut self) -> Option<RenderFeedback> {
        self.collect_retired();
        self.feedback.pop().ok()
    }
}

/// Audio-callback end of the render rings
pub struct Renderer {
    commands: Consumer<RenderCommand>,
    feedback: Producer<RenderFeedback>,
    retired: Producer<Arc<SourceBuffer>>,
    clock: Arc<AtomicU64>,
    eq: Equalizer,
    meter: LevelMeter,
    source: Option<Arc<SourceBuffer>>,
    /// Old source waiting for room in the retired ring
    retiring: Option<Arc<SourceBuffer>>,
    segment: Option<Segment>,
    played: u64,
    playing: bool,
}

impl Renderer {
    /// Hand the parked source to the controller if the ring has room.
    /// Returns false while it is still parked.
    fn flush_retiring(&mut self) -> bool {
        if let Some(old) = self.retiring.take() {
            if let Err(PushError::Full(old)) = self.retired.push(old) {
                self.retiring = Some(old);
                return false;
            }
        }
        true
    }

    fn drain_commands(&mut self) {
        // Commands wait while a parked source would otherwise be dropped here
        while self.flush_retiring() {
            let Ok(command) = self.commands.pop() else {
                break;
            };
            match command {
                RenderCommand::Load(source) => {
                    self.eq.reset();
                    self.retiring = self.source.replace(source);
                    self.segment = None;
                    self.playing = false;
                }
                RenderCommand::Schedule(segment) => {
                    self.segment = Some(segment);
                    self.played = 0;
                    self.clock
                        .store(pack(segment.generation, 0), Ordering::Release);
                }
                RenderCommand::Play => self.playing = true,
                RenderCommand::Stop => {
                    self.playing = false;
                    self.segment = None;
                }
                RenderCommand::Snapshot(snapshot) => self.eq.apply_snapshot(&snapshot),
            }
        }
    }

    /// Fill `out` (interleaved, `channels` wide) from the scheduled segment.
    /// Silence when stopped or nothing is scheduled.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        self.drain_commands();

        let channels = channels.max(1);
        let (Some(source), Some(segment), true) = (self.source.as_ref(), self.segment, self.playing)
        else {
            out.fill(0.0);
            return;
        };

        let frames_out = out.len() / channels;
        let remaining = segment.frames.saturating_sub(self.played);
        let n = frames_out.min(remaining as usize);
        let start = (segment.start_frame + self.played) as usize;

        for (f, frame) in out.chunks_exact_mut(channels).take(n).enumerate() {
            for (c, sample) in frame.iter_mut().enumerate() {
                *sample = source.sample(start + f, c);
            }
        }
        out[n * channels..].fill(0.0);

        let rendered = &mut out[..n * channels];
        self.eq.process_interleaved(rendered, channels);
        for frame in rendered.chunks_exact(channels) {
            self.meter.push(frame[0]);
        }
        if let Some(db) = self.meter.finish() {
            let _ = self.feedback.push(RenderFeedback::Level(db));
        }

        self.played += n as u64;
        self.clock
            .store(pack(segment.generation, self.played), Ordering::Release);

        if self.played >= segment.frames {
            self.playing = false;
            self.segment = None;
            let _ = self.feedback.push(RenderFeedback::SegmentFinished {
                generation: segment.generation,
            });
        }
    }
}
