//! Recording Pipeline
//!
//! Capture goes through an rtrb ring into a writer thread that streams
//! 32-bit float WAV. Stopping moves the session to `Finalizing`; only a
//! file that passes the bounded readiness check becomes `Ready`.
//!
//! ```text
//! Idle ─start─▶ Recording ─stop─▶ Finalizing ─ready─▶ Ready
//!                                      └────retries exhausted──▶ Failed
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use hound::{SampleFormat, WavSpec, WavWriter};
use rtrb::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::ReadinessPolicy;
use crate::error::{CoreError, CoreResult};
use crate::message::WorkerEvent;
use crate::source::probe;

/// How long the writer sleeps when the ring is empty
const WRITER_IDLE: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Recording,
    Finalizing,
    Ready,
    Failed,
}

/// State machine for one take
#[derive(Debug, Clone)]
pub struct RecordingSession {
    state: RecordingState,
    path: Option<PathBuf>,
    started: Option<Instant>,
    elapsed: Duration,
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            state: RecordingState::Idle,
            path: None,
            started: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Running time while recording, frozen once stopped
    pub fn elapsed(&self) -> Duration {
        match (self.state, self.started) {
            (RecordingState::Recording, Some(started)) => started.elapsed(),
            _ => self.elapsed,
        }
    }

    pub fn start(&mut self, path: PathBuf) -> CoreResult<()> {
        if matches!(
            self.state,
            RecordingState::Recording | RecordingState::Finalizing
        ) {
            return Err(CoreError::AlreadyRecording);
        }
        info!("Recording to {:?}", path);
        self.state = RecordingState::Recording;
        self.path = Some(path);
        self.started = Some(Instant::now());
        self.elapsed = Duration::ZERO;
        Ok(())
    }

    /// Recording -> Finalizing. Returns the file to check.
    pub fn stop(&mut self) -> CoreResult<PathBuf> {
        if self.state != RecordingState::Recording {
            return Err(CoreError::NotRecording);
        }
        let path = self.path.clone().ok_or(CoreError::NotRecording)?;
        self.elapsed = self.elapsed();
        self.state = RecordingState::Finalizing;
        Ok(path)
    }

    /// The take is lost before it could be checked. Returns false when
    /// there was no live take to fail.
    pub fn fail(&mut self) -> bool {
        if !matches!(
            self.state,
            RecordingState::Recording | RecordingState::Finalizing
        ) {
            return false;
        }
        self.elapsed = self.elapsed();
        self.state = RecordingState::Failed;
        true
    }

    /// Settle a finalizing session. Returns the file only when it became
    /// `Ready`; that is the sole case that may announce a new recording.
    pub fn complete(&mut self, ready: bool) -> Option<PathBuf> {
        if self.state != RecordingState::Finalizing {
            return None;
        }
        if ready {
            self.state = RecordingState::Ready;
            self.path.clone()
        } else {
            self.state = RecordingState::Failed;
            None
        }
    }
}

/// File exists and is strictly larger than the policy minimum
pub fn check_ready(path: &Path, policy: &ReadinessPolicy) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.len() > policy.min_bytes)
        .unwrap_or(false)
}

/// Poll [`check_ready`] up to `policy.attempts` times with a fixed delay.
/// Returns the attempt that succeeded.
pub fn wait_until_ready(
    path: &Path,
    policy: &ReadinessPolicy,
    mut sleep: impl FnMut(Duration),
) -> CoreResult<u32> {
    for attempt in 1..=policy.attempts {
        if check_ready(path, policy) {
            debug!("{:?} ready after {} attempt(s)", path, attempt);
            return Ok(attempt);
        }
        if attempt < policy.attempts {
            sleep(policy.backoff());
        }
    }
    Err(CoreError::RecordingNotReady {
        path: path.to_path_buf(),
        attempts: policy.attempts,
    })
}

/// Run the readiness check on the calling thread and post the outcome.
/// Blocks for up to `policy.attempts` backoffs.
pub fn finalize(path: PathBuf, policy: &ReadinessPolicy, events: &Sender<WorkerEvent>) {
    let result = wait_until_ready(&path, policy, thread::sleep).and_then(|_| probe(&path));
    if let Err(e) = &result {
        warn!("Recording failed: {}", e);
    }
    let _ = events.send(WorkerEvent::RecordingFinalized { path, result });
}

/// Run [`finalize`] on a worker
pub fn spawn_finalizer(
    path: PathBuf,
    policy: ReadinessPolicy,
    events: Sender<WorkerEvent>,
) -> CoreResult<JoinHandle<()>> {
    thread::Builder::new()
        .name("eq10-finalize".into())
        .spawn(move || finalize(path, &policy, &events))
        .map_err(CoreError::Io)
}

/// Writer half of a capture: drains the ring into a WAV file
pub struct WavCapture {
    stop: Arc<AtomicBool>,
    writer: Option<JoinHandle<CoreResult<u64>>>,
    path: PathBuf,
}

impl WavCapture {
    /// Create the file and start the writer. Push interleaved samples into
    /// the returned producer from the capture callback.
    pub fn start(
        path: PathBuf,
        channels: u16,
        sample_rate: u32,
        capacity: usize,
    ) -> CoreResult<(Self, Producer<f32>)> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(&path, spec)?;
        let (producer, consumer) = RingBuffer::new(capacity);
        let stop = Arc::new(AtomicBool::new(false));

        let stop_clone = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("eq10-capture-writer".into())
            .spawn(move || Self::writer_main(writer, consumer, stop_clone))
            .map_err(CoreError::Io)?;

        Ok((
            Self {
                stop,
                writer: Some(handle),
                path,
            },
            producer,
        ))
    }

    fn writer_main(
        mut writer: WavWriter<std::io::BufWriter<fs::File>>,
        mut consumer: Consumer<f32>,
        stop: Arc<AtomicBool>,
    ) -> CoreResult<u64> {
        let mut written = 0_u64;
        loop {
            // Read the flag before draining so nothing pushed before stop is lost
            let stopping = stop.load(Ordering::Acquire);
            let mut drained = false;
            while let Ok(sample) = consumer.pop() {
                writer.write_sample(sample)?;
                written += 1;
                drained = true;
            }
            if stopping {
                break;
            }
            if !drained {
                thread::sleep(WRITER_IDLE);
            }
        }
        writer.finalize()?;
        Ok(written)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the writer and finalize the file. Returns samples written.
    pub fn finish(mut self) -> CoreResult<u64> {
        self.stop.store(true, Ordering::Release);
        let handle = self.writer.take().ok_or(CoreError::NotRecording)?;
        match handle.join() {
            Ok(result) => {
                if let Ok(n) = &result {
                    info!("Capture finished: {} samples to {:?}", n, self.path);
                }
                result
            }
            Err(_) => {
                error!("Capture writer panicked");
                Err(CoreError::Encoding("capture writer panicked".into()))
            }
        }
    }
}

impl Drop for WavCapture {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReadinessPolicy {
        ReadinessPolicy::default()
    }

    #[test]
    fn test_session_happy_path() {
        let mut session = RecordingSession::new();
        assert_eq!(session.state(), RecordingState::Idle);

        session.start(PathBuf::from("take.wav")).unwrap();
        assert_eq!(session.state(), RecordingState::Recording);
        assert!(matches!(
            session.start(PathBuf::from("other.wav")),
            Err(CoreError::AlreadyRecording)
        ));

        let path = session.stop().unwrap();
        assert_eq!(path, PathBuf::from("take.wav"));
        assert_eq!(session.state(), RecordingState::Finalizing);

        let frozen = session.elapsed();
        assert_eq!(session.elapsed(), frozen);

        assert_eq!(session.complete(true), Some(PathBuf::from("take.wav")));
        assert_eq!(session.state(), RecordingState::Ready);
    }

    #[test]
    fn test_session_failure_announces_nothing() {
        let mut session = RecordingSession::new();
        session.start(PathBuf::from("take.wav")).unwrap();
        session.stop().unwrap();
        assert_eq!(session.complete(false), None);
        assert_eq!(session.state(), RecordingState::Failed);

        // A failed session can start over
        assert!(session.start(PathBuf::from("again.wav")).is_ok());
    }

    #[test]
    fn test_fail_from_recording_or_finalizing() {
        let mut session = RecordingSession::new();
        assert!(!session.fail());
        assert_eq!(session.state(), RecordingState::Idle);

        session.start(PathBuf::from("take.wav")).unwrap();
        assert!(session.fail());
        assert_eq!(session.state(), RecordingState::Failed);

        session.start(PathBuf::from("again.wav")).unwrap();
        session.stop().unwrap();
        assert!(session.fail());
        assert_eq!(session.complete(true), None);
        assert_eq!(session.state(), RecordingState::Failed);
    }

    #[test]
    fn test_stop_without_recording() {
        let mut session = RecordingSession::new();
        assert!(matches!(session.stop(), Err(CoreError::NotRecording)));
        assert_eq!(session.complete(true), None);
    }

    #[test]
    fn test_small_file_fails_after_all_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.wav");
        fs::write(&path, vec![0_u8; 1024]).unwrap();

        let mut sleeps = Vec::new();
        let result = wait_until_ready(&path, &policy(), |d| sleeps.push(d));

        assert!(matches!(
            result,
            Err(CoreError::RecordingNotReady { attempts: 5, .. })
        ));
        // Four waits between five checks
        assert_eq!(sleeps, vec![Duration::from_millis(200); 4]);

        let mut session = RecordingSession::new();
        session.start(path).unwrap();
        session.stop().unwrap();
        assert_eq!(session.complete(result.is_ok()), None);
        assert_eq!(session.state(), RecordingState::Failed);
    }

    #[test]
    fn test_missing_file_not_ready() {
        assert!(!check_ready(Path::new("/no/such/take.wav"), &policy()));
    }

    #[test]
    fn test_large_file_ready_first_try() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.wav");
        fs::write(&path, vec![0_u8; 1025]).unwrap();

        let mut slept = false;
        let attempt = wait_until_ready(&path, &policy(), |_| slept = true).unwrap();
        assert_eq!(attempt, 1);
        assert!(!slept);
    }

    #[test]
    fn test_finalizer_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        fs::write(&path, b"").unwrap();
        let quick = ReadinessPolicy {
            backoff_ms: 1,
            ..policy()
        };
        let (tx, rx) = crossbeam_channel::unbounded();

        spawn_finalizer(path.clone(), quick, tx).unwrap().join().unwrap();
        match rx.recv().unwrap() {
            WorkerEvent::RecordingFinalized { path: p, result } => {
                assert_eq!(p, path);
                assert!(result.is_err());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_capture_writes_everything_pushed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.wav");
        let (capture, mut producer) = WavCapture::start(path.clone(), 2, 48000, 4096).unwrap();

        for i in 0..2000 {
            while producer.push(i as f32 / 2000.0).is_err() {
                thread::yield_now();
            }
        }
        assert_eq!(capture.finish().unwrap(), 2000);

        let info = probe(&path).unwrap();
        assert_eq!(info.frames, 1000);
        assert_eq!(info.channels, 2);
        assert!(check_ready(&path, &policy()));
    }
}
