//! Capture Backends
//!
//! The controller starts and stops recordings through [`CaptureBackend`].
//! [`DeviceCapture`] owns the cpal input stream on a dedicated thread,
//! since streams can't move between threads. Neither call waits on the
//! device: a failed open comes back as [`WorkerEvent::CaptureFailed`] and
//! a stopped take as [`WorkerEvent::RecordingFinalized`].

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use cpal::traits::DeviceTrait;
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::{ReadinessPolicy, StreamConfig};
use crate::device::{AudioDevice, DeviceType};
use crate::error::{CoreError, CoreResult};
use crate::message::{Event, WorkerEvent};
use crate::recording::{finalize, WavCapture};
use crate::stream::InputStream;

pub trait CaptureBackend: Send {
    /// Begin capturing into a new file at `path`. Returns as soon as the
    /// attempt is under way; an open failure is posted to `workers`.
    fn start(&mut self, path: &Path, workers: Sender<WorkerEvent>) -> CoreResult<()>;

    /// End the take. The file is closed and checked against `policy` off
    /// the caller's thread, then posted as `RecordingFinalized`.
    fn stop(&mut self, policy: ReadinessPolicy) -> CoreResult<()>;
}

struct ActiveCapture {
    stop: Sender<ReadinessPolicy>,
    thread: JoinHandle<()>,
}

/// Records from a cpal input device
pub struct DeviceCapture {
    device_name: Option<String>,
    buffer_size: u32,
    ring_capacity: usize,
    events: Sender<Event>,
    active: Option<ActiveCapture>,
    finishing: Option<JoinHandle<()>>,
}

impl DeviceCapture {
    /// `device_name` of `None` picks the host default input
    pub fn new(
        device_name: Option<String>,
        buffer_size: u32,
        ring_capacity: usize,
        events: Sender<Event>,
    ) -> Self {
        Self {
            device_name,
            buffer_size,
            ring_capacity,
            events,
            active: None,
            finishing: None,
        }
    }

    fn open(
        device_name: Option<&str>,
        buffer_size: u32,
        ring_capacity: usize,
        path: &Path,
        events: Sender<Event>,
    ) -> CoreResult<(InputStream, WavCapture)> {
        let device = AudioDevice::open(DeviceType::Input, device_name)?;
        let supported = device
            .default_input_config()
            .map_err(|e| CoreError::StreamBuildError(e.to_string()))?;
        let config = StreamConfig {
            sample_rate: supported.sample_rate().0,
            channels: supported.channels(),
            buffer_size,
        };
        let (capture, producer) =
            WavCapture::start(path.to_path_buf(), config.channels, config.sample_rate, ring_capacity)?;
        let stream = InputStream::open(&device, config, producer, events)?;
        Ok((stream, capture))
    }

    fn capture_main(
        device_name: Option<String>,
        buffer_size: u32,
        ring_capacity: usize,
        path: PathBuf,
        events: Sender<Event>,
        workers: Sender<WorkerEvent>,
        stop: Receiver<ReadinessPolicy>,
    ) {
        let (stream, capture) =
            match Self::open(device_name.as_deref(), buffer_size, ring_capacity, &path, events) {
                Ok(parts) => parts,
                Err(error) => {
                    warn!("Capture into {:?} did not start: {}", path, error);
                    let _ = workers.send(WorkerEvent::CaptureFailed { path, error });
                    return;
                }
            };
        info!("Capture started into {:?}", path);

        // A closed channel means the controller is gone; keep the file anyway
        let policy = stop.recv().ok();
        drop(stream);
        match capture.finish() {
            Ok(samples) => debug!("Capture thread wrote {} samples", samples),
            Err(e) => warn!("Capture writer failed: {}", e),
        }
        if let Some(policy) = policy {
            finalize(path, &policy, &workers);
        }
    }

    /// Join threads that are done: a take whose device never opened, or
    /// the previous take's finalization
    fn reap(&mut self) {
        if self.active.as_ref().is_some_and(|a| a.thread.is_finished()) {
            if let Some(active) = self.active.take() {
                let _ = active.thread.join();
            }
        }
        if let Some(thread) = self.finishing.take() {
            if thread.is_finished() {
                let _ = thread.join();
            } else {
                self.finishing = Some(thread);
            }
        }
    }
}

impl CaptureBackend for DeviceCapture {
    fn start(&mut self, path: &Path, workers: Sender<WorkerEvent>) -> CoreResult<()> {
        self.reap();
        if self.active.is_some() {
            return Err(CoreError::AlreadyRecording);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (stop_tx, stop_rx) = bounded(1);
        let device_name = self.device_name.clone();
        let buffer_size = self.buffer_size;
        let ring_capacity = self.ring_capacity;
        let events = self.events.clone();
        let path_buf = path.to_path_buf();

        let thread = thread::Builder::new()
            .name("eq10-capture".into())
            .spawn(move || {
                Self::capture_main(
                    device_name,
                    buffer_size,
                    ring_capacity,
                    path_buf,
                    events,
                    workers,
                    stop_rx,
                )
            })
            .map_err(CoreError::Io)?;

        self.active = Some(ActiveCapture {
            stop: stop_tx,
            thread,
        });
        Ok(())
    }

    fn stop(&mut self, policy: ReadinessPolicy) -> CoreResult<()> {
        let active = self.active.take().ok_or(CoreError::NotRecording)?;
        // Fails only if the device never opened; CaptureFailed covers that
        let _ = active.stop.send(policy);
        self.finishing = Some(active.thread);
        Ok(())
    }
}

impl Drop for DeviceCapture {
    fn drop(&mut self) {
        // Dropping the stop sender ends the take; the file is still closed
        if let Some(active) = self.active.take() {
            drop(active.stop);
            let _ = active.thread.join();
        }
        if let Some(thread) = self.finishing.take() {
            let _ = thread.join();
        }
    }
}
