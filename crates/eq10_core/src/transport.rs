//! Transport Controller
//!
//! Play/pause/seek and position tracking. While playing, the position is
//! `paused_frame + graph clock`; while stopped, `paused_frame` alone is
//! authoritative.

use std::sync::Arc;

use tracing::{debug, info};

use crate::render::{RenderGraph, Segment};
use crate::source::{SourceBuffer, SourceInfo};

/// Format seconds as `m:ss`
pub fn format_time(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

pub struct TransportController<G: RenderGraph> {
    graph: G,
    source: Option<SourceInfo>,
    paused_frame: u64,
    total_frames: u64,
    sample_rate: u32,
    progress: f32,
    playing: bool,
    is_seeking: bool,
    timer_active: bool,
    generation: u64,
}

impl<G: RenderGraph> TransportController<G> {
    pub fn new(graph: G) -> Self {
        Self {
            graph,
            source: None,
            paused_frame: 0,
            total_frames: 0,
            sample_rate: 0,
            progress: 0.0,
            playing: false,
            is_seeking: false,
            timer_active: false,
            generation: 0,
        }
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    pub fn source(&self) -> Option<&SourceInfo> {
        self.source.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn paused_frame(&self) -> u64 {
        self.paused_frame
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Whether the periodic progress refresh should be running
    pub fn timer_active(&self) -> bool {
        self.timer_active
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_seeking(&self) -> bool {
        self.is_seeking
    }

    /// Raised by the caller while the user drags the position slider
    pub fn set_seeking(&mut self, seeking: bool) {
        self.is_seeking = seeking;
    }

    /// Make `source` the active source and play it from frame 0.
    ///
    /// Ingestion has already succeeded by the time this is called, so a
    /// source that fails to open never reaches the transport.
    pub fn load(&mut self, info: SourceInfo, buffer: Arc<SourceBuffer>) {
        self.halt();
        self.paused_frame = 0;
        self.progress = 0.0;
        self.total_frames = buffer.frames();
        self.sample_rate = info.sample_rate;
        info!(
            "Loaded {:?} ({} frames, {})",
            info.path,
            self.total_frames,
            format_time(info.duration_secs())
        );
        self.source = Some(info);
        self.graph.load(buffer);
        self.start_segment();
    }

    /// Pause if playing, otherwise resume from the paused frame.
    /// Resuming at the very end starts over from frame 0.
    pub fn toggle_playback(&mut self) {
        if self.source.is_none() {
            return;
        }
        if self.playing {
            let clock = self.graph.sample_time().unwrap_or(0);
            self.paused_frame = (self.paused_frame + clock).min(self.total_frames);
            self.halt();
            self.progress = self.ratio(self.paused_frame);
            debug!("Paused at frame {}", self.paused_frame);
        } else {
            if self.paused_frame >= self.total_frames {
                self.paused_frame = 0;
            }
            self.start_segment();
        }
    }

    /// Jump to `fraction` of the source and play from there
    pub fn seek_and_resume(&mut self, fraction: f32) {
        if self.source.is_none() {
            return;
        }
        self.halt();
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let target = (f64::from(fraction) * self.total_frames as f64) as u64;
        self.paused_frame = target.min(self.total_frames.saturating_sub(1));
        self.progress = self.ratio(self.paused_frame);
        self.start_segment();
    }

    /// Periodic refresh. Returns the new progress, or `None` when stopped
    /// or while a seek gesture holds the slider.
    pub fn refresh_progress(&mut self) -> Option<f32> {
        if !self.playing || self.is_seeking {
            return None;
        }
        self.progress = self.ratio(self.current_frame());
        Some(self.progress)
    }

    /// Handle the graph reporting the end of a segment. Reports from a
    /// segment that has since been stopped or replaced are ignored.
    pub fn on_segment_finished(&mut self, generation: u64) -> bool {
        if !self.playing || generation != self.generation {
            debug!("Ignoring stale segment completion {}", generation);
            return false;
        }
        self.halt();
        self.paused_frame = 0;
        self.progress = 0.0;
        true
    }

    /// Stop without moving the paused frame
    pub fn stop(&mut self) {
        if self.playing {
            let clock = self.graph.sample_time().unwrap_or(0);
            self.paused_frame = (self.paused_frame + clock).min(self.total_frames);
        }
        self.halt();
    }

    /// Position in frames, from whichever source is authoritative
    pub fn current_frame(&self) -> u64 {
        if self.playing {
            let clock = self.graph.sample_time().unwrap_or(0);
            (self.paused_frame + clock).min(self.total_frames)
        } else {
            self.paused_frame
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames_to_secs(self.total_frames)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.frames_to_secs(self.current_frame())
    }

    pub fn elapsed_text(&self) -> String {
        format_time(self.elapsed_secs())
    }

    pub fn remaining_text(&self) -> String {
        format!("-{}", format_time(self.duration_secs() - self.elapsed_secs()))
    }

    fn frames_to_secs(&self, frames: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / f64::from(self.sample_rate)
    }

    fn ratio(&self, frame: u64) -> f32 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (frame as f64 / self.total_frames as f64).clamp(0.0, 1.0) as f32
    }

    /// Stop the graph and invalidate anything already scheduled
    fn halt(&mut self) {
        self.graph.stop();
        self.generation += 1;
        self.playing = false;
        self.timer_active = false;
    }

    fn start_segment(&mut self) {
        self.generation += 1;
        let remaining = self.total_frames.saturating_sub(self.paused_frame);
        self.graph.schedule(Segment {
            start_frame: self.paused_frame,
            frames: remaining,
            generation: self.generation,
        });
        self.graph.play();
        self.playing = true;
        self.timer_active = true;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::render::RenderFeedback;
    use eq10_dsp::EqSnapshot;
    use std::collections::VecDeque;
    use std::path::PathBuf;

    /// Output rate of [`FakeGraph`] and of every [`source`]
    pub(crate) const FAKE_RATE: u32 = 1000;

    /// Records calls; the clock is set by the test
    #[derive(Default)]
    pub(crate) struct FakeGraph {
        pub calls: Vec<String>,
        pub clock: Option<u64>,
        pub scheduled: Option<Segment>,
        pub published: Vec<EqSnapshot>,
        pub feedback: VecDeque<RenderFeedback>,
    }

    impl RenderGraph for FakeGraph {
        fn sample_rate(&self) -> u32 {
            FAKE_RATE
        }
        fn load(&mut self, source: Arc<SourceBuffer>) {
            self.calls.push(format!("load {}", source.frames()));
        }
        fn schedule(&mut self, segment: Segment) {
            self.calls
                .push(format!("schedule {}+{}", segment.start_frame, segment.frames));
            self.scheduled = Some(segment);
            self.clock = Some(0);
        }
        fn play(&mut self) {
            self.calls.push("play".into());
        }
        fn stop(&mut self) {
            self.calls.push("stop".into());
            self.scheduled = None;
            self.clock = None;
        }
        fn sample_time(&self) -> Option<u64> {
            self.clock
        }
        fn publish(&mut self, snapshot: EqSnapshot) {
            self.published.push(snapshot);
        }
        fn poll(&mut self) -> Option<RenderFeedback> {
            self.feedback.pop_front()
        }
    }

    pub(crate) fn source(frames: usize) -> (SourceInfo, Arc<SourceBuffer>) {
        let buffer = SourceBuffer::from_interleaved(vec![0.0; frames * 2], 2, FAKE_RATE);
        let info = SourceInfo {
            path: PathBuf::from("song.wav"),
            frames: frames as u64,
            sample_rate: FAKE_RATE,
            channels: 2,
        };
        (info, Arc::new(buffer))
    }

    fn loaded(frames: usize) -> TransportController<FakeGraph> {
        let mut transport = TransportController::new(FakeGraph::default());
        let (info, buffer) = source(frames);
        transport.load(info, buffer);
        transport
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(59.9), "0:59");
        assert_eq!(format_time(61.0), "1:01");
        assert_eq!(format_time(3600.0), "60:00");
        assert_eq!(format_time(-3.0), "0:00");
        assert_eq!(format_time(f64::NAN), "0:00");
    }

    #[test]
    fn test_load_plays_from_start() {
        let transport = loaded(10_000);
        assert!(transport.is_playing());
        assert!(transport.timer_active());
        assert_eq!(transport.paused_frame(), 0);
        assert_eq!(transport.duration_secs(), 10.0);
        assert_eq!(
            transport.graph().calls,
            vec!["stop", "load 10000", "schedule 0+10000", "play"]
        );
    }

    #[test]
    fn test_toggle_pauses_at_clock() {
        let mut transport = loaded(10_000);
        transport.graph_mut().clock = Some(2500);
        transport.toggle_playback();

        assert!(!transport.is_playing());
        assert!(!transport.timer_active());
        assert_eq!(transport.paused_frame(), 2500);
        assert_eq!(transport.progress(), 0.25);
        assert_eq!(transport.elapsed_text(), "0:02");
    }

    #[test]
    fn test_toggle_resumes_remaining_segment() {
        let mut transport = loaded(10_000);
        transport.graph_mut().clock = Some(4000);
        transport.toggle_playback();
        transport.toggle_playback();

        assert!(transport.is_playing());
        let segment = transport.graph().scheduled.unwrap();
        assert_eq!(segment.start_frame, 4000);
        assert_eq!(segment.frames, 6000);
        assert_eq!(segment.generation, transport.generation());
    }

    #[test]
    fn test_resume_at_end_restarts() {
        let mut transport = loaded(100);
        transport.graph_mut().clock = Some(100);
        transport.toggle_playback();
        assert_eq!(transport.paused_frame(), 100);

        transport.toggle_playback();
        let segment = transport.graph().scheduled.unwrap();
        assert_eq!(segment.start_frame, 0);
        assert_eq!(segment.frames, 100);
    }

    #[test]
    fn test_seek_is_idempotent() {
        let mut transport = loaded(10_000);
        transport.seek_and_resume(0.5);
        let first = (transport.paused_frame(), transport.progress());
        transport.seek_and_resume(0.5);
        let second = (transport.paused_frame(), transport.progress());

        assert_eq!(first, second);
        assert_eq!(first.0, 5000);
        assert!(transport.is_playing());
    }

    #[test]
    fn test_seek_clamps_to_last_frame() {
        let mut transport = loaded(1000);
        transport.seek_and_resume(1.0);
        assert_eq!(transport.paused_frame(), 999);
        transport.seek_and_resume(7.0);
        assert_eq!(transport.paused_frame(), 999);
        transport.seek_and_resume(-1.0);
        assert_eq!(transport.paused_frame(), 0);
    }

    #[test]
    fn test_seek_stops_first() {
        let mut transport = loaded(1000);
        transport.graph_mut().calls.clear();
        transport.seek_and_resume(0.25);
        assert_eq!(
            transport.graph().calls,
            vec!["stop", "schedule 250+750", "play"]
        );
    }

    #[test]
    fn test_refresh_progress() {
        let mut transport = loaded(1000);
        transport.seek_and_resume(0.5);
        transport.graph_mut().clock = Some(100);
        assert_eq!(transport.refresh_progress(), Some(0.6));

        // Clock past the end stays clamped
        transport.graph_mut().clock = Some(10_000);
        assert_eq!(transport.refresh_progress(), Some(1.0));
    }

    #[test]
    fn test_refresh_suppressed_while_seeking() {
        let mut transport = loaded(1000);
        transport.graph_mut().clock = Some(500);
        transport.set_seeking(true);
        assert_eq!(transport.refresh_progress(), None);
        assert_eq!(transport.progress(), 0.0);

        transport.set_seeking(false);
        assert_eq!(transport.refresh_progress(), Some(0.5));
    }

    #[test]
    fn test_segment_finished_rewinds() {
        let mut transport = loaded(1000);
        let generation = transport.generation();
        assert!(transport.on_segment_finished(generation));
        assert!(!transport.is_playing());
        assert_eq!(transport.paused_frame(), 0);
        assert_eq!(transport.progress(), 0.0);
    }

    #[test]
    fn test_stale_segment_finished_ignored() {
        let mut transport = loaded(1000);
        let old = transport.generation();
        transport.seek_and_resume(0.5);
        assert!(!transport.on_segment_finished(old));
        assert!(transport.is_playing());
        assert_eq!(transport.paused_frame(), 500);
    }

    #[test]
    fn test_controls_without_source_are_noops() {
        let mut transport = TransportController::new(FakeGraph::default());
        transport.toggle_playback();
        transport.seek_and_resume(0.5);
        assert!(!transport.is_playing());
        assert!(transport.graph().calls.is_empty());
    }

    #[test]
    fn test_reload_resets_position() {
        let mut transport = loaded(1000);
        transport.seek_and_resume(0.8);
        let (info, buffer) = source(500);
        transport.load(info, buffer);
        assert_eq!(transport.paused_frame(), 0);
        assert_eq!(transport.total_frames(), 500);
        assert!(transport.is_playing());
    }
}
