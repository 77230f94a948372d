//! Audio Stream Management
//!
//! CPAL stream setup. The output callback drives a [`Renderer`]; the input
//! callback pushes captured samples into the recording ring. Neither
//! callback allocates, locks or blocks.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig as CpalStreamConfig};
use crossbeam_channel::Sender;
use rtrb::Producer;
use tracing::info;

use crate::config::StreamConfig;
use crate::error::{CoreError, CoreResult};
use crate::message::Event;
use crate::render::Renderer;

fn cpal_config(config: &StreamConfig) -> CpalStreamConfig {
    CpalStreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
    }
}

/// Playback stream. Dropping it stops audio.
pub struct OutputStream {
    // Held to keep audio flowing
    #[allow(dead_code)]
    stream: Stream,
    pub config: StreamConfig,
}

impl OutputStream {
    pub fn open(
        device: &Device,
        config: StreamConfig,
        mut renderer: Renderer,
        event_sender: Sender<Event>,
    ) -> CoreResult<Self> {
        config.validate().map_err(CoreError::ConfigError)?;
        let channels = config.channels as usize;

        let stream = device
            .build_output_stream(
                &cpal_config(&config),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.render(data, channels);
                },
                move |err| {
                    let _ = event_sender.try_send(Event::error(err));
                },
                None,
            )
            .map_err(|e| CoreError::StreamBuildError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CoreError::StreamPlayError(e.to_string()))?;
        info!(
            "Output stream running: {} Hz, {} ch, {:.1} ms",
            config.sample_rate,
            config.channels,
            config.latency_ms()
        );

        Ok(Self { stream, config })
    }
}

/// Capture stream feeding a recording ring. Dropping it stops capture.
pub struct InputStream {
    #[allow(dead_code)]
    stream: Stream,
    pub config: StreamConfig,
}

impl InputStream {
    pub fn open(
        device: &Device,
        config: StreamConfig,
        mut producer: Producer<f32>,
        event_sender: Sender<Event>,
    ) -> CoreResult<Self> {
        config.validate().map_err(CoreError::ConfigError)?;
        let err_sender = event_sender.clone();

        let stream = device
            .build_input_stream(
                &cpal_config(&config),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let n = data.len().min(producer.slots());
                    let written = producer
                        .write_chunk_uninit(n)
                        .map_or(0, |chunk| chunk.fill_from_iter(data.iter().copied()));
                    if written < data.len() {
                        // Writer isn't keeping up
                        let _ = event_sender.try_send(Event::BufferOverrun);
                    }
                },
                move |err| {
                    let _ = err_sender.try_send(Event::error(err));
                },
                None,
            )
            .map_err(|e| CoreError::StreamBuildError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CoreError::StreamPlayError(e.to_string()))?;
        info!(
            "Input stream running: {} Hz, {} ch",
            config.sample_rate, config.channels
        );

        Ok(Self { stream, config })
    }
}
