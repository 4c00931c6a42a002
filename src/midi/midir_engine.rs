//! Device I/O through `midir`.

use crate::midi::{MidiError, MidiMessage, OutputEndpoint, Result};
use log::{debug, info, trace};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

const CLIENT_NAME: &str = "beatclockrs";

/// Names of all MIDI input ports currently visible to the system.
pub fn list_input_ports() -> Vec<String> {
    match MidiInput::new(&format!("{}-list-in", CLIENT_NAME)) {
        Ok(midi_in) => midi_in
            .ports()
            .iter()
            .filter_map(|p| midi_in.port_name(p).ok())
            .collect(),
        Err(e) => {
            debug!("Failed to initialise MIDI input for listing: {}", e);
            Vec::new()
        }
    }
}

/// Names of all MIDI output ports currently visible to the system.
pub fn list_output_ports() -> Vec<String> {
    match MidiOutput::new(&format!("{}-list-out", CLIENT_NAME)) {
        Ok(midi_out) => midi_out
            .ports()
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect(),
        Err(e) => {
            debug!("Failed to initialise MIDI output for listing: {}", e);
            Vec::new()
        }
    }
}

/// Returns the first port name containing `needle`, ignoring case.
pub fn find_port_by_substring<'a>(ports: &'a [String], needle: &str) -> Option<&'a str> {
    if needle.is_empty() {
        return None;
    }
    let needle = needle.to_lowercase();
    ports
        .iter()
        .find(|name| name.to_lowercase().contains(&needle))
        .map(String::as_str)
}

/// An output endpoint backed by a midir connection.
pub struct MidirOutput {
    name: String,
    connection: Option<MidiOutputConnection>,
}

impl MidirOutput {
    /// Opens the output port whose name is exactly `port_name`.
    pub fn open(port_name: &str) -> Result<Self> {
        let midi_out = MidiOutput::new(&format!("{}-out", CLIENT_NAME))
            .map_err(|e| MidiError::ConnectionError(e.to_string()))?;

        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| midi_out.port_name(p).map(|n| n == port_name).unwrap_or(false))
            .ok_or_else(|| MidiError::PortNotFound(port_name.to_string()))?;

        info!("Connecting to MIDI output port: {}", port_name);
        let connection = midi_out
            .connect(port, &format!("{}-output-conn", CLIENT_NAME))
            .map_err(|e| MidiError::ConnectionError(e.to_string()))?;

        Ok(Self {
            name: port_name.to_string(),
            connection: Some(connection),
        })
    }

    /// Creates a virtual output other applications can connect to.
    #[cfg(unix)]
    pub fn open_virtual(port_name: &str) -> Result<Self> {
        use midir::os::unix::VirtualOutput;

        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| MidiError::ConnectionError(e.to_string()))?;
        let connection = midi_out
            .create_virtual(port_name)
            .map_err(|e| MidiError::ConnectionError(e.to_string()))?;
        info!("Virtual MIDI output '{}' created", port_name);

        Ok(Self {
            name: port_name.to_string(),
            connection: Some(connection),
        })
    }

    #[cfg(not(unix))]
    pub fn open_virtual(port_name: &str) -> Result<Self> {
        Err(MidiError::ConnectionError(format!(
            "virtual port '{}' is not supported on this platform",
            port_name
        )))
    }
}

impl OutputEndpoint for MidirOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, msg: &MidiMessage) -> Result<()> {
        let conn = self
            .connection
            .as_mut()
            .ok_or_else(|| MidiError::Closed(self.name.clone()))?;
        trace!("Sending {:?} to {}", msg, self.name);
        conn.send(&msg.to_bytes())
            .map_err(|e| MidiError::SendError(e.to_string()))
    }

    fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
            info!("MIDI output '{}' closed", self.name);
        }
    }

    fn is_closed(&self) -> bool {
        self.connection.is_none()
    }
}

impl Drop for MidirOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// A live input connection. Messages are pushed into the callback given to
/// [`MidirInput::open`] from midir's own thread.
pub struct MidirInput {
    name: String,
    connection: Option<MidiInputConnection<()>>,
}

impl MidirInput {
    /// Opens the input port named `port_name` and forwards every parsed
    /// message, together with the port name, to `on_message`.
    pub fn open<F>(port_name: &str, mut on_message: F) -> Result<Self>
    where
        F: FnMut(MidiMessage, &str) + Send + 'static,
    {
        let mut midi_in = MidiInput::new(&format!("{}-in", CLIENT_NAME))
            .map_err(|e| MidiError::ConnectionError(e.to_string()))?;
        midi_in.ignore(Ignore::None);

        let ports = midi_in.ports();
        let port = ports
            .iter()
            .find(|p| midi_in.port_name(p).map(|n| n == port_name).unwrap_or(false))
            .ok_or_else(|| MidiError::PortNotFound(port_name.to_string()))?;

        let source = port_name.to_string();
        let connection = midi_in
            .connect(
                port,
                &format!("{}-input-conn", CLIENT_NAME),
                move |_stamp, data, _| match MidiMessage::parse(data) {
                    Some(msg) => on_message(msg, &source),
                    None => trace!("Ignoring unparsed MIDI bytes {:02X?}", data),
                },
                (),
            )
            .map_err(|e| MidiError::ConnectionError(e.to_string()))?;
        info!("MIDI input '{}' opened", port_name);

        Ok(Self {
            name: port_name.to_string(),
            connection: Some(connection),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
            info!("MIDI input '{}' closed", self.name);
        }
    }
}

impl Drop for MidirInput {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_port_is_case_insensitive() {
        let ports = vec![
            "Midi Through:Midi Through Port-0 14:0".to_string(),
            "nanoKONTROL2:nanoKONTROL2 MIDI 1 20:0".to_string(),
        ];
        assert_eq!(
            find_port_by_substring(&ports, "NANOkontrol"),
            Some("nanoKONTROL2:nanoKONTROL2 MIDI 1 20:0")
        );
        assert_eq!(find_port_by_substring(&ports, "launchpad"), None);
        assert_eq!(find_port_by_substring(&ports, ""), None);
    }
}
