//! Waveform Worker
//!
//! Runs decimation off the controller context and posts the result back,
//! tagged with the load generation it was started for.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use eq10_dsp::{decimate, first_channel};
use tracing::{debug, warn};

use crate::message::WorkerEvent;
use crate::source::SourceBuffer;

/// Display-side waveform state
#[derive(Debug, Clone, Default)]
pub struct WaveformState {
    samples: Vec<f32>,
    loading: bool,
    generation: u64,
}

impl WaveformState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// A new source is being processed; anything older is now stale
    pub fn begin(&mut self, generation: u64) {
        self.generation = generation;
        self.loading = true;
        self.samples.clear();
    }

    /// Accept a finished result. Returns false for stale results.
    pub fn complete(&mut self, generation: u64, samples: Vec<f32>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.samples = samples;
        self.loading = false;
        true
    }
}

/// Decimate the first channel of `source` down to at most about `cap`
/// points on a worker thread
pub fn spawn_waveform(
    source: Arc<SourceBuffer>,
    cap: usize,
    generation: u64,
    events: Sender<WorkerEvent>,
) -> Option<JoinHandle<()>> {
    let spawned = thread::Builder::new()
        .name("eq10-waveform".into())
        .spawn(move || {
            let mono = first_channel(source.samples(), source.channels());
            let samples = decimate(&mono, cap);
            debug!(
                "Waveform ready: {} -> {} points (generation {})",
                mono.len(),
                samples.len(),
                generation
            );
            let _ = events.send(WorkerEvent::Waveform {
                generation,
                samples,
            });
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Failed to spawn waveform worker: {}", e);
            None
        }
    }
}
