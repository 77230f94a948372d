//! eq10 command-line front end
//!
//! Wires the controller engine to real cpal devices, a file-backed store and
//! optionally a MIDI input port.

mod midi;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::unbounded;
use eq10_core::{
    probe, render_channel, AudioDevice, DeviceCapture, DeviceType, Engine, EngineConfig, Event,
    ExportFormat, Exporter, FileStore, MemoryStore, OutputStream, ParameterStore,
    Persistence, RecordingState, StreamConfig,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = EngineConfig::stable();

    match cli.command {
        Commands::Play {
            path,
            preset,
            bypass_zero,
            midi,
        } => run_play(
            config,
            &path,
            cli.device.as_deref(),
            preset.as_deref(),
            bypass_zero,
            midi.as_deref(),
        ),
        Commands::Record { seconds, input } => run_record(config, seconds, input),
        Commands::Export { source, format } => run_export(config, &source, format),
        Commands::Presets => run_presets(),
        Commands::Devices => run_devices(),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eq10=info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "10-band equalizer player, recorder and exporter", long_about = None)]
struct Cli {
    /// Output device name (host default when omitted)
    #[arg(long, global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a file through the equalizer until it ends.
    Play {
        path: PathBuf,
        /// Built-in or saved preset to apply before playback.
        #[arg(short, long)]
        preset: Option<String>,
        /// Bypass the preset's zero-gain bands.
        #[arg(long)]
        bypass_zero: bool,
        /// Connect the first MIDI input whose name contains this text.
        #[arg(long)]
        midi: Option<String>,
    },
    /// Record from an input device for a fixed time.
    Record {
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,
        /// Input device name (host default when omitted)
        #[arg(long)]
        input: Option<String>,
    },
    /// Export a file as lossless, lossy-high or lossy-low.
    Export {
        source: PathBuf,
        #[arg(short, long, default_value = "lossy-high")]
        format: ExportFormat,
    },
    /// List built-in and saved presets.
    Presets,
    /// List audio devices and MIDI inputs.
    Devices,
}

fn open_store() -> Result<FileStore> {
    FileStore::default_location().context("No configuration directory on this platform")
}

fn run_play(
    config: EngineConfig,
    path: &Path,
    device: Option<&str>,
    preset: Option<&str>,
    bypass_zero: bool,
    midi_port: Option<&str>,
) -> Result<()> {
    let info = probe(path).with_context(|| format!("Cannot play {:?}", path))?;
    let stream_config = StreamConfig {
        sample_rate: info.sample_rate,
        channels: 2,
        buffer_size: config.stream.buffer_size,
    };

    let output = AudioDevice::open(DeviceType::Output, device)?;
    let (handle, renderer) = render_channel(config.ring_capacity, info.sample_rate)?;
    let (event_tx, event_rx) = unbounded();
    let _stream = OutputStream::open(&output, stream_config, renderer, event_tx.clone())
        .context("Failed to open output stream")?;

    let capture = DeviceCapture::new(
        None,
        config.stream.buffer_size,
        config.capture_ring_capacity,
        event_tx.clone(),
    );
    let engine = Engine::spawn(config, handle, open_store()?, Box::new(capture), (event_tx, event_rx))?;

    let _midi = midi_port
        .map(|hint| midi::connect(hint, engine.midi_sender()))
        .transpose()?;
    if let Some(name) = preset {
        engine.apply_preset(name, bypass_zero)?;
    }
    engine.load(path)?;

    let mut started = false;
    while let Some(event) = engine.wait_event() {
        match event {
            Event::Loaded {
                title,
                duration_secs,
            } => info!("Playing '{}' ({:.1} s)", title, duration_secs),
            Event::LoadFailed { message } => bail!("Load failed: {}", message),
            Event::PlaybackChanged { playing: true } => started = true,
            Event::PlaybackChanged { playing: false } if started => break,
            Event::Progress {
                elapsed, remaining, ..
            } => eprint!("\r{} {}   ", elapsed, remaining),
            Event::ParametersChanged {
                active_preset: Some(name),
                ..
            } => info!("Preset: {}", name),
            Event::Error { message } => warn!("{}", message),
            _ => {}
        }
    }
    eprintln!();
    Ok(())
}

fn run_record(config: EngineConfig, seconds: u64, input: Option<String>) -> Result<()> {
    // Nothing is played back, so the renderer stays detached
    let (handle, _renderer) = render_channel(config.ring_capacity, config.stream.sample_rate)?;
    let (event_tx, event_rx) = unbounded();
    let capture = DeviceCapture::new(
        input,
        config.stream.buffer_size,
        config.capture_ring_capacity,
        event_tx.clone(),
    );
    let engine = Engine::spawn(config, handle, open_store()?, Box::new(capture), (event_tx, event_rx))?;

    engine.start_recording()?;
    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut stopping = false;

    loop {
        if !stopping && Instant::now() >= deadline {
            engine.stop_recording()?;
            stopping = true;
        }
        let Some(event) = engine.wait_event_timeout(Duration::from_millis(100)) else {
            continue;
        };
        match event {
            Event::RecordingStateChanged { state } => {
                info!("Recording: {:?}", state);
                if state == RecordingState::Failed {
                    bail!("Recording did not produce a usable file");
                }
            }
            Event::RecordingReady { path } => {
                println!("{}", path.display());
                return Ok(());
            }
            Event::BufferOverrun => warn!("Capture overrun, samples dropped"),
            Event::Error { message } => bail!("{}", message),
            _ => {}
        }
    }
}

fn run_export(config: EngineConfig, source: &Path, format: ExportFormat) -> Result<()> {
    config.export.validate().map_err(anyhow::Error::msg)?;
    let exporter = Exporter::new(config.export);
    let path = exporter
        .export(source, format)
        .with_context(|| format!("Export of {:?} failed", source))?;
    println!("{}", path.display());
    Ok(())
}

fn run_presets() -> Result<()> {
    let mut params = ParameterStore::new();
    match FileStore::default_location() {
        Some(store) => params.replace_user_presets(Persistence::new(store).load_presets()),
        None => params.replace_user_presets(Persistence::new(MemoryStore::default()).load_presets()),
    }

    for preset in params.all_presets() {
        let gains: Vec<String> = preset.gains().iter().map(|g| format!("{:+.0}", g)).collect();
        println!("{:<16} {}", preset.name(), gains.join(" "));
    }
    Ok(())
}

fn run_devices() -> Result<()> {
    for device in AudioDevice::enumerate_all()? {
        println!(
            "{:?}{} {} ({} ch, {:?})",
            device.device_type,
            if device.is_default { "*" } else { " " },
            device.name,
            device.max_channels,
            device.sample_rates
        );
    }
    match midi::port_names() {
        Ok(ports) => {
            for name in ports {
                println!("Midi    {}", name);
            }
        }
        Err(e) => warn!("MIDI unavailable: {}", e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_export_format() {
        let cli = Cli::parse_from(["eq10_app", "export", "take.wav", "--format", "lossy-low"]);
        match cli.command {
            Commands::Export { format, .. } => assert_eq!(format, ExportFormat::LossyLow),
            other => panic!("Expected export, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_play_options() {
        let cli = Cli::parse_from([
            "eq10_app",
            "play",
            "song.wav",
            "--preset",
            "Bass Boost",
            "--bypass-zero",
            "--device",
            "Speakers",
        ]);
        assert_eq!(cli.device.as_deref(), Some("Speakers"));
        match cli.command {
            Commands::Play {
                preset,
                bypass_zero,
                midi,
                ..
            } => {
                assert_eq!(preset.as_deref(), Some("Bass Boost"));
                assert!(bypass_zero);
                assert!(midi.is_none());
            }
            other => panic!("Expected play, got {:?}", other),
        }
    }
}
