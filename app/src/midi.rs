//! MIDI input ports
//!
//! The connection callback runs on midir's thread and forwards raw bytes to
//! the engine; decoding happens on the controller thread.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Sender;
use midir::{Ignore, MidiInput, MidiInputConnection};
use tracing::{info, warn};

const CLIENT_NAME: &str = "eq10";

/// Names of every MIDI input port on the system
pub fn port_names() -> Result<Vec<String>> {
    let midi_in = MidiInput::new(CLIENT_NAME)?;
    let mut names = Vec::new();
    for port in midi_in.ports().iter() {
        names.push(midi_in.port_name(port)?);
    }
    Ok(names)
}

/// Connect to the first input whose name contains `hint`.
/// Dropping the connection closes the port.
pub fn connect(hint: &str, sink: Sender<Vec<u8>>) -> Result<MidiInputConnection<()>> {
    let mut midi_in = MidiInput::new(CLIENT_NAME)?;
    // Only Control-Change matters
    midi_in.ignore(Ignore::All);

    let port = midi_in
        .ports()
        .into_iter()
        .find(|p| {
            midi_in
                .port_name(p)
                .map(|name| name.contains(hint))
                .unwrap_or(false)
        })
        .with_context(|| format!("No MIDI input matching '{}'", hint))?;
    let name = midi_in.port_name(&port)?;
    info!("Opening MIDI input: {}", name);

    midi_in
        .connect(
            &port,
            "eq10-midi-in",
            move |_stamp, message, _| {
                if sink.try_send(message.to_vec()).is_err() {
                    warn!("MIDI message dropped, controller busy");
                }
            },
            (),
        )
        .map_err(|e| anyhow!("Failed to connect to MIDI input '{}': {}", name, e))
}
