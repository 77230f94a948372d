//! Controller Engine - Main Entry Point
//!
//! The [`Engine`] owns the controller thread and coordinates the UI, the
//! rendering graph and the background workers.
//!
//! # Architecture
//!
//! ```text
//!   UI ──Command──▶ ┌──────────────────────┐ ──Event──▶ UI
//!   MIDI ──bytes──▶ │  eq10-controller     │
//!                   │  (Controller: params,│ ◀──WorkerEvent── open / waveform /
//!                   │   transport, record) │                  finalize / export
//!                   └──────────┬───────────┘
//!                   rtrb rings │ ▲ level + segment feedback
//!                              ▼ │
//!                   ┌──────────────────────┐
//!                   │ cpal output callback │
//!                   └──────────────────────┘
//! ```
//!
//! All user-facing state lives on the controller thread. The render
//! callback and the workers only ever post values back to it.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Local;
use crossbeam_channel::{bounded, never, select, tick, unbounded, Receiver, Sender};
use eq10_dsp::LedLadder;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capture::CaptureBackend;
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::export::{spawn_export, ExportFormat, Exporter};
use crate::message::{Command, Event, WorkerEvent};
use crate::midi::{MappedParameter, MidiMappingTable};
use crate::params::ParameterStore;
use crate::persistence::{KeyValueStore, Persistence};
use crate::playlist::{Playlist, PlaylistItem};
use crate::recording::{spawn_finalizer, RecordingSession, RecordingState};
use crate::render::{RenderFeedback, RenderGraph};
use crate::source::{open_source, probe};
use crate::transport::TransportController;
use crate::waveform::{spawn_waveform, WaveformState};

/// Single-threaded owner of every piece of user-facing state
pub struct Controller<G: RenderGraph, S: KeyValueStore> {
    config: EngineConfig,
    params: ParameterStore,
    mappings: MidiMappingTable,
    transport: TransportController<G>,
    waveform: WaveformState,
    recording: RecordingSession,
    capture: Box<dyn CaptureBackend>,
    playlist: Playlist,
    persistence: Persistence<S>,
    exporter: Exporter,
    ladder: LedLadder,
    worker_tx: Sender<WorkerEvent>,
    events: Sender<Event>,
    load_generation: u64,
}

impl<G: RenderGraph, S: KeyValueStore> Controller<G, S> {
    /// Restore persisted state and push the initial snapshot to `graph`
    pub fn new(
        config: EngineConfig,
        graph: G,
        store: S,
        capture: Box<dyn CaptureBackend>,
        worker_tx: Sender<WorkerEvent>,
        events: Sender<Event>,
    ) -> Self {
        let persistence = Persistence::new(store);
        let mut params = ParameterStore::new();
        let mut mappings = MidiMappingTable::new();
        let playlist = persistence.restore_all(&mut params, &mut mappings);

        let mut transport = TransportController::new(graph);
        transport.graph_mut().publish(params.snapshot());

        Self {
            exporter: Exporter::new(config.export.clone()),
            config,
            params,
            mappings,
            transport,
            waveform: WaveformState::new(),
            recording: RecordingSession::new(),
            capture,
            playlist,
            persistence,
            ladder: LedLadder::standard(),
            worker_tx,
            events,
            load_generation: 0,
        }
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn mappings(&self) -> &MidiMappingTable {
        &self.mappings
    }

    pub fn transport(&self) -> &TransportController<G> {
        &self.transport
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recording.state()
    }

    pub fn waveform(&self) -> &WaveformState {
        &self.waveform
    }

    /// Whether the progress timer should be running
    pub fn timer_active(&self) -> bool {
        self.transport.timer_active()
    }

    /// Apply a UI command. Returns false once the controller should exit.
    pub fn handle_command(&mut self, command: Command) -> bool {
        debug!("Command: {:?}", command);
        match command {
            Command::Load(path) => self.open(path),
            Command::PlayItem(id) => match self.playlist.get(id) {
                Some(item) => {
                    let path = item.reference().clone();
                    self.open(path);
                }
                None => warn!("No playlist item {}", id),
            },
            Command::TogglePlayback => {
                self.transport.toggle_playback();
                self.emit_playback();
            }
            Command::SeekAndResume(fraction) => {
                self.transport.seek_and_resume(fraction);
                self.emit_playback();
                self.emit_progress();
            }
            Command::SetSeeking(seeking) => self.transport.set_seeking(seeking),
            Command::UpdateBand { band, gain_db } => {
                self.params.update_band(band, gain_db);
                self.parameters_changed();
            }
            Command::SetBandShape { band, shape } => {
                self.params.set_band_shape(band, shape);
                self.parameters_changed();
            }
            Command::SetBandBypass { band, bypass } => {
                self.params.set_band_bypass(band, bypass);
                self.parameters_changed();
            }
            Command::SetMasterGain(gain) => {
                self.params.set_master_gain(gain);
                self.parameters_changed();
            }
            Command::ApplyPreset { name, with_bypass } => match self.params.find_preset(&name) {
                Some(preset) => {
                    if with_bypass {
                        self.params.apply_preset_with_bypass(&preset);
                    } else {
                        self.params.apply_preset(&preset);
                    }
                    self.parameters_changed();
                }
                None => self.report(CoreError::PresetNotFound(name)),
            },
            Command::ApplyBandGroup(groups) => {
                self.params.apply_band_group(groups);
                self.parameters_changed();
            }
            Command::ResetToDefault => {
                self.params.reset_to_default();
                self.parameters_changed();
            }
            Command::SavePreset(name) => {
                let result = self.params.save_user_preset(&name).map(|_| ());
                self.presets_changed(result);
            }
            Command::DeletePreset(id) => {
                let result = self.params.delete_user_preset(id);
                self.presets_changed(result);
            }
            Command::AssignCc {
                parameter,
                cc,
                force,
            } => {
                let result = if force {
                    self.mappings.assign_with_override(parameter, cc)
                } else {
                    self.mappings.assign(parameter, cc)
                };
                match result {
                    Ok(()) => self.mapping_changed(parameter),
                    Err(e) => self.report(e),
                }
            }
            Command::StartMidiLearn(parameter) => self.mappings.start_learning(parameter),
            Command::CancelMidiLearn => self.mappings.cancel_learning(),
            Command::StartRecording => {
                if let Err(e) = self.start_recording() {
                    self.report(e);
                }
            }
            Command::StopRecording => {
                if let Err(e) = self.stop_recording() {
                    self.report(e);
                }
            }
            Command::Export { source, format } => self.export(source, format),
            Command::AddToPlaylist(path) => self.probe(path),
            Command::RemoveFromPlaylist(id) => {
                if self.playlist.remove(id).is_some() {
                    self.playlist_changed();
                }
            }
            Command::RequestState => self.emit(Event::StateUpdate {
                playing: self.transport.is_playing(),
                progress: self.transport.progress(),
                recording: self.recording.state(),
                active_preset: self.params.active_preset().map(str::to_string),
            }),
            Command::Shutdown => {
                info!("Shutdown requested");
                return false;
            }
        }
        true
    }

    /// Apply a result posted by a background worker
    pub fn handle_worker(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::SourceOpened { result, path } => match result {
                Ok((info, _)) if info.sample_rate != self.transport.graph().sample_rate() => {
                    let err = CoreError::SampleRateMismatch {
                        source_rate: info.sample_rate,
                        output_rate: self.transport.graph().sample_rate(),
                    };
                    warn!("Load of {:?} failed: {}", path, err);
                    self.emit(Event::LoadFailed {
                        message: err.to_string(),
                    });
                }
                Ok((info, buffer)) => {
                    self.load_generation += 1;
                    let title = info.title();
                    let duration_secs = info.duration_secs();
                    self.transport.load(info, Arc::clone(&buffer));
                    self.waveform.begin(self.load_generation);

                    self.emit(Event::Loaded {
                        title,
                        duration_secs,
                    });
                    self.emit(Event::WaveformLoading);
                    self.emit_playback();

                    let spawned = spawn_waveform(
                        buffer,
                        self.config.waveform_cap,
                        self.load_generation,
                        self.worker_tx.clone(),
                    )
                    .is_some();
                    if !spawned {
                        warn!("Waveform worker did not start for {:?}", path);
                    }
                    self.waveform_started(spawned);
                }
                Err(e) => {
                    warn!("Load of {:?} failed: {}", path, e);
                    self.emit(Event::LoadFailed {
                        message: e.to_string(),
                    });
                }
            },
            WorkerEvent::Probed { result } => match result {
                Ok(info) => {
                    self.playlist.push(PlaylistItem::from_source(&info));
                    self.playlist_changed();
                }
                Err(e) => self.report(e),
            },
            WorkerEvent::Waveform {
                generation,
                samples,
            } => {
                if self.waveform.complete(generation, samples) {
                    self.emit(Event::WaveformReady {
                        samples: self.waveform.samples().to_vec(),
                    });
                } else {
                    debug!("Dropping stale waveform {}", generation);
                }
            }
            WorkerEvent::CaptureFailed { path, error } => {
                if self.recording.path() != Some(path.as_path()) {
                    debug!("Ignoring capture failure for old take {:?}", path);
                    return;
                }
                self.abandon_recording();
                self.report(error);
            }
            WorkerEvent::RecordingFinalized { path, result } => {
                let info = match result {
                    Ok(info) => Some(info),
                    Err(e) => {
                        warn!("Recording {:?} is unusable: {}", path, e);
                        None
                    }
                };
                let ready = self.recording.complete(info.is_some());
                self.emit(Event::RecordingStateChanged {
                    state: self.recording.state(),
                });
                if let (Some(path), Some(info)) = (ready, info) {
                    info!("Recording ready: {:?}", path);
                    self.emit(Event::RecordingReady { path });
                    self.playlist.push(PlaylistItem::from_source(&info));
                    self.playlist_changed();
                }
            }
            WorkerEvent::ExportFinished { format, result } => match result {
                Ok(path) => self.emit(Event::ExportFinished { path, format }),
                Err(e) => {
                    error!("{} export failed: {}", format, e);
                    self.emit(Event::ExportFailed {
                        format,
                        message: e.to_string(),
                    });
                }
            },
        }
    }

    /// Route raw bytes from the MIDI transport
    pub fn handle_midi(&mut self, bytes: &[u8]) {
        let learning = self.mappings.learning().is_some();
        match self.mappings.handle_message(bytes, &mut self.params) {
            Ok(Some(parameter)) if learning => self.mapping_changed(parameter),
            Ok(Some(_)) => self.parameters_changed(),
            Ok(None) => {}
            Err(e) => self.report(e),
        }
    }

    /// Progress timer: drain render feedback then refresh the position
    pub fn on_tick(&mut self) {
        let mut level = None;
        while let Some(feedback) = self.transport.graph_mut().poll() {
            match feedback {
                RenderFeedback::Level(db) => level = Some(db),
                RenderFeedback::SegmentFinished { generation } => {
                    if self.transport.on_segment_finished(generation) {
                        self.emit_playback();
                        self.emit_progress();
                    }
                }
            }
        }
        if let Some(db) = level {
            self.emit(Event::Level {
                db,
                lit: self.ladder.lit_count(db),
            });
        }
        if self.transport.refresh_progress().is_some() {
            self.emit_progress();
        }
    }

    /// Stop everything and write the session out
    pub fn shutdown(&mut self) {
        self.transport.stop();
        if self.recording.state() == RecordingState::Recording {
            let _ = self.recording.stop();
            if let Err(e) = self.capture.stop(self.config.readiness) {
                warn!("Capture did not stop cleanly: {}", e);
            }
        }

        if let Err(e) = self.persistence.save_session(&self.params) {
            warn!("Failed to save session: {}", e);
        }
        if let Err(e) = self.persistence.save_mappings(&self.mappings) {
            warn!("Failed to save MIDI mappings: {}", e);
        }
        if let Err(e) = self.persistence.save_playlist(&self.playlist) {
            warn!("Failed to save playlist: {}", e);
        }
        if let Err(e) = self.persistence.save_presets(self.params.user_presets()) {
            warn!("Failed to save presets: {}", e);
        }
        self.emit(Event::Stopped);
    }

    fn open(&mut self, path: PathBuf) {
        let tx = self.worker_tx.clone();
        let spawned = thread::Builder::new()
            .name("eq10-open".into())
            .spawn(move || {
                let result = open_source(&path).map(|(info, buffer)| (info, Arc::new(buffer)));
                let _ = tx.send(WorkerEvent::SourceOpened { result, path });
            });
        if let Err(e) = spawned {
            self.report(CoreError::Io(e));
        }
    }

    fn probe(&mut self, path: PathBuf) {
        let tx = self.worker_tx.clone();
        let spawned = thread::Builder::new()
            .name("eq10-probe".into())
            .spawn(move || {
                let _ = tx.send(WorkerEvent::Probed {
                    result: probe(&path),
                });
            });
        if let Err(e) = spawned {
            self.report(CoreError::Io(e));
        }
    }

    fn export(&mut self, source: PathBuf, format: ExportFormat) {
        info!("Exporting {:?} as {}", source, format);
        if let Err(e) = spawn_export(
            self.exporter.clone(),
            source,
            format,
            self.worker_tx.clone(),
        ) {
            self.emit(Event::ExportFailed {
                format,
                message: e.to_string(),
            });
        }
    }

    fn start_recording(&mut self) -> CoreResult<()> {
        if matches!(
            self.recording.state(),
            RecordingState::Recording | RecordingState::Finalizing
        ) {
            return Err(CoreError::AlreadyRecording);
        }
        let name = format!("{}_eq10_take.wav", Local::now().format("%Y%m%d_%H%M%S_%3f"));
        let path = self.config.recordings_dir().join(name);

        self.capture.start(&path, self.worker_tx.clone())?;
        self.recording.start(path)?;
        self.emit(Event::RecordingStateChanged {
            state: self.recording.state(),
        });
        Ok(())
    }

    /// Only flips the session; the backend closes and checks the file
    fn stop_recording(&mut self) -> CoreResult<()> {
        let path = self.recording.stop()?;
        self.emit(Event::RecordingStateChanged {
            state: self.recording.state(),
        });
        if let Err(e) = self.capture.stop(self.config.readiness) {
            // Nothing will close the take, so check whatever reached the disk
            warn!("Capture did not stop cleanly: {}", e);
            let spawned = spawn_finalizer(path, self.config.readiness, self.worker_tx.clone());
            self.finalizer_started(spawned)?;
        }
        Ok(())
    }

    fn finalizer_started(&mut self, spawned: CoreResult<JoinHandle<()>>) -> CoreResult<()> {
        if let Err(e) = spawned {
            self.abandon_recording();
            return Err(e);
        }
        Ok(())
    }

    fn abandon_recording(&mut self) {
        if self.recording.fail() {
            self.emit(Event::RecordingStateChanged {
                state: self.recording.state(),
            });
        }
    }

    /// Without a worker nothing will finish the waveform, so settle it empty
    fn waveform_started(&mut self, spawned: bool) {
        if !spawned && self.waveform.complete(self.load_generation, Vec::new()) {
            self.emit(Event::WaveformReady {
                samples: Vec::new(),
            });
        }
    }

    fn parameters_changed(&mut self) {
        let snapshot = self.params.snapshot();
        self.transport.graph_mut().publish(snapshot);
        let bands = self.params.bands();
        self.emit(Event::ParametersChanged {
            gains: snapshot.gains(),
            bypass: std::array::from_fn(|i| bands[i].bypass),
            master_gain: snapshot.master_gain,
            active_preset: self.params.active_preset().map(str::to_string),
        });
    }

    fn presets_changed(&mut self, result: CoreResult<()>) {
        if let Err(e) = result {
            self.report(e);
            return;
        }
        if let Err(e) = self.persistence.save_presets(self.params.user_presets()) {
            warn!("Failed to save presets: {}", e);
        }
        let names = self
            .params
            .all_presets()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        self.emit(Event::PresetsChanged { names });
    }

    fn mapping_changed(&mut self, parameter: MappedParameter) {
        if let Err(e) = self.persistence.save_mappings(&self.mappings) {
            warn!("Failed to save MIDI mappings: {}", e);
        }
        self.emit(Event::MappingChanged {
            parameter: parameter.label().to_string(),
            cc: self.mappings.cc_for(parameter),
        });
    }

    fn playlist_changed(&mut self) {
        if let Err(e) = self.persistence.save_playlist(&self.playlist) {
            warn!("Failed to save playlist: {}", e);
        }
        let titles = self.playlist.iter().map(|i| i.title().to_string()).collect();
        self.emit(Event::PlaylistChanged { titles });
    }

    fn emit_playback(&self) {
        self.emit(Event::PlaybackChanged {
            playing: self.transport.is_playing(),
        });
    }

    fn emit_progress(&self) {
        self.emit(Event::Progress {
            progress: self.transport.progress(),
            elapsed: self.transport.elapsed_text(),
            remaining: self.transport.remaining_text(),
        });
    }

    fn report(&self, err: CoreError) {
        warn!("{}", err);
        self.emit(Event::error(err));
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }
}

/// Handle to the controller thread
///
/// Lives on the UI/main thread and talks to the controller only through
/// channels.
pub struct Engine {
    command_sender: Sender<Command>,
    midi_sender: Sender<Vec<u8>>,
    event_receiver: Receiver<Event>,
    controller_thread: Option<JoinHandle<()>>,
    config: EngineConfig,
}

impl Engine {
    /// Start the controller thread.
    ///
    /// `events` is passed in whole so the caller can hand clones of the
    /// sender to the audio streams before the engine exists.
    pub fn spawn<G, S>(
        config: EngineConfig,
        graph: G,
        store: S,
        capture: Box<dyn CaptureBackend>,
        events: (Sender<Event>, Receiver<Event>),
    ) -> CoreResult<Self>
    where
        G: RenderGraph + Send + 'static,
        S: KeyValueStore + Send + 'static,
    {
        config.validate().map_err(CoreError::ConfigError)?;

        let (command_sender, command_receiver) = bounded::<Command>(32);
        let (midi_sender, midi_receiver) = bounded::<Vec<u8>>(256);
        let (worker_tx, worker_rx) = unbounded::<WorkerEvent>();
        let (event_sender, event_receiver) = events;
        let config_clone = config.clone();

        let controller_thread = thread::Builder::new()
            .name("eq10-controller".into())
            .spawn(move || {
                let controller =
                    Controller::new(config_clone, graph, store, capture, worker_tx, event_sender);
                Self::controller_main(controller, command_receiver, midi_receiver, worker_rx);
            })
            .map_err(CoreError::Io)?;

        Ok(Self {
            command_sender,
            midi_sender,
            event_receiver,
            controller_thread: Some(controller_thread),
            config,
        })
    }

    pub fn load(&self, path: impl Into<PathBuf>) -> CoreResult<()> {
        self.send(Command::Load(path.into()))
    }

    pub fn play_item(&self, id: Uuid) -> CoreResult<()> {
        self.send(Command::PlayItem(id))
    }

    pub fn toggle_playback(&self) -> CoreResult<()> {
        self.send(Command::TogglePlayback)
    }

    pub fn seek_and_resume(&self, fraction: f32) -> CoreResult<()> {
        self.send(Command::SeekAndResume(fraction))
    }

    /// Set EQ band gain
    pub fn set_band_gain(&self, band: usize, gain_db: f32) -> CoreResult<()> {
        self.send(Command::UpdateBand { band, gain_db })
    }

    /// Linear master gain, clamped to 0.0 - 2.0 by the controller
    pub fn set_master_gain(&self, gain: f32) -> CoreResult<()> {
        self.send(Command::SetMasterGain(gain))
    }

    pub fn apply_preset(&self, name: impl Into<String>, with_bypass: bool) -> CoreResult<()> {
        self.send(Command::ApplyPreset {
            name: name.into(),
            with_bypass,
        })
    }

    pub fn start_recording(&self) -> CoreResult<()> {
        self.send(Command::StartRecording)
    }

    pub fn stop_recording(&self) -> CoreResult<()> {
        self.send(Command::StopRecording)
    }

    pub fn export(&self, source: impl Into<PathBuf>, format: ExportFormat) -> CoreResult<()> {
        self.send(Command::Export {
            source: source.into(),
            format,
        })
    }

    /// Request current state (triggers a StateUpdate event)
    pub fn request_state(&self) -> CoreResult<()> {
        self.send(Command::RequestState)
    }

    /// Sender for the MIDI transport to push raw messages into
    pub fn midi_sender(&self) -> Sender<Vec<u8>> {
        self.midi_sender.clone()
    }

    /// Poll for events (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Wait for next event (blocking)
    pub fn wait_event(&self) -> Option<Event> {
        self.event_receiver.recv().ok()
    }

    pub fn wait_event_timeout(&self, timeout: Duration) -> Option<Event> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn send(&self, command: Command) -> CoreResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| CoreError::ChannelSendError)
    }

    /// Controller thread main loop
    fn controller_main<G: RenderGraph, S: KeyValueStore>(
        mut controller: Controller<G, S>,
        commands: Receiver<Command>,
        midi: Receiver<Vec<u8>>,
        workers: Receiver<WorkerEvent>,
    ) {
        info!("Controller thread started");
        let ticker = tick(controller.config.progress_interval());
        let idle = never();

        loop {
            // Only wake for the timer while something is playing
            let timer = if controller.timer_active() {
                &ticker
            } else {
                &idle
            };

            select! {
                recv(commands) -> msg => match msg {
                    Ok(command) => {
                        if !controller.handle_command(command) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(workers) -> msg => {
                    if let Ok(event) = msg {
                        controller.handle_worker(event);
                    }
                }
                recv(midi) -> msg => {
                    if let Ok(bytes) = msg {
                        controller.handle_midi(&bytes);
                    }
                }
                recv(timer) -> _ => controller.on_tick(),
            }
        }

        controller.shutdown();
        info!("Controller thread shutting down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.command_sender.send(Command::Shutdown);
        if let Some(handle) = self.controller_thread.take() {
            let _ = handle.join();
        }
    }
}
