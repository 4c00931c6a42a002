use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Custom error type for MIDI operations
#[derive(Debug, Error)]
pub enum MidiError {
    /// Error when sending a MIDI message
    #[error("MIDI send error: {0}")]
    SendError(String),
    /// Error when connecting to a MIDI device
    #[error("MIDI connection error: {0}")]
    ConnectionError(String),
    /// No port name contained the requested substring
    #[error("MIDI port matching '{0}' not found")]
    PortNotFound(String),
    /// The endpoint was already closed
    #[error("MIDI endpoint '{0}' is closed")]
    Closed(String),
}

/// Result type for MIDI operations
pub type Result<T> = std::result::Result<T, MidiError>;

/// Represents a MIDI message that can be sent or received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note On message with note number and velocity
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note Off message with note number and velocity
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// Polyphonic key pressure
    PolyPressure { channel: u8, note: u8, value: u8 },
    /// Control Change message with controller number and value
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    /// Program Change message with program number
    ProgramChange { channel: u8, program: u8 },
    /// Channel pressure (aftertouch)
    ChannelPressure { channel: u8, value: u8 },
    /// Pitch bend, centred on zero (-8192..=8191)
    PitchBend { channel: u8, value: i16 },
    /// MIDI Clock timing message
    Clock,
    /// MIDI Start message
    Start,
    /// MIDI Stop message
    Stop,
    /// MIDI Continue message
    Continue,
}

/// The type of a [`MidiMessage`], named the way rule files refer to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    NoteOn,
    NoteOff,
    PolyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    Clock,
    Start,
    Stop,
    Continue,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::NoteOn => "note_on",
            MessageKind::NoteOff => "note_off",
            MessageKind::PolyPressure => "polytouch",
            MessageKind::ControlChange => "control_change",
            MessageKind::ProgramChange => "program_change",
            MessageKind::ChannelPressure => "aftertouch",
            MessageKind::PitchBend => "pitchwheel",
            MessageKind::Clock => "clock",
            MessageKind::Start => "start",
            MessageKind::Stop => "stop",
            MessageKind::Continue => "continue",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let kind = match s {
            "note_on" => MessageKind::NoteOn,
            "note_off" => MessageKind::NoteOff,
            "polytouch" => MessageKind::PolyPressure,
            "control_change" => MessageKind::ControlChange,
            "program_change" => MessageKind::ProgramChange,
            "aftertouch" => MessageKind::ChannelPressure,
            "pitchwheel" => MessageKind::PitchBend,
            "clock" => MessageKind::Clock,
            "start" => MessageKind::Start,
            "stop" => MessageKind::Stop,
            "continue" => MessageKind::Continue,
            other => return Err(format!("unknown MIDI message type '{}'", other)),
        };
        Ok(kind)
    }
}

impl MidiMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            MidiMessage::NoteOn { .. } => MessageKind::NoteOn,
            MidiMessage::NoteOff { .. } => MessageKind::NoteOff,
            MidiMessage::PolyPressure { .. } => MessageKind::PolyPressure,
            MidiMessage::ControlChange { .. } => MessageKind::ControlChange,
            MidiMessage::ProgramChange { .. } => MessageKind::ProgramChange,
            MidiMessage::ChannelPressure { .. } => MessageKind::ChannelPressure,
            MidiMessage::PitchBend { .. } => MessageKind::PitchBend,
            MidiMessage::Clock => MessageKind::Clock,
            MidiMessage::Start => MessageKind::Start,
            MidiMessage::Stop => MessageKind::Stop,
            MidiMessage::Continue => MessageKind::Continue,
        }
    }

    /// Channel of a channel-voice message; system realtime messages have none.
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::PolyPressure { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::ChannelPressure { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// The first data byte that identifies the message target: note,
    /// controller or program number.
    pub fn primary_value(&self) -> Option<u8> {
        match *self {
            MidiMessage::NoteOn { note, .. } | MidiMessage::NoteOff { note, .. } => Some(note),
            MidiMessage::ControlChange { controller, .. } => Some(controller),
            MidiMessage::ProgramChange { program, .. } => Some(program),
            _ => None,
        }
    }

    /// True for Start, Stop and Continue.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MidiMessage::Start | MidiMessage::Stop | MidiMessage::Continue
        )
    }

    pub fn parse(data: &[u8]) -> Option<MidiMessage> {
        let status = *data.first()?;
        let channel = status & 0x0F;

        match status & 0xF0 {
            0x90 if data.len() >= 3 => Some(MidiMessage::NoteOn {
                channel,
                note: data[1],
                velocity: data[2],
            }),
            0x80 if data.len() >= 3 => Some(MidiMessage::NoteOff {
                channel,
                note: data[1],
                velocity: data[2],
            }),
            0xA0 if data.len() >= 3 => Some(MidiMessage::PolyPressure {
                channel,
                note: data[1],
                value: data[2],
            }),
            0xB0 if data.len() >= 3 => Some(MidiMessage::ControlChange {
                channel,
                controller: data[1],
                value: data[2],
            }),
            0xC0 if data.len() >= 2 => Some(MidiMessage::ProgramChange {
                channel,
                program: data[1],
            }),
            0xD0 if data.len() >= 2 => Some(MidiMessage::ChannelPressure {
                channel,
                value: data[1],
            }),
            0xE0 if data.len() >= 3 => {
                let raw = (u16::from(data[2] & 0x7F) << 7) | u16::from(data[1] & 0x7F);
                Some(MidiMessage::PitchBend {
                    channel,
                    value: raw as i16 - 8192,
                })
            }
            0xF0 => match status {
                0xF8 => Some(MidiMessage::Clock),
                0xFA => Some(MidiMessage::Start),
                0xFB => Some(MidiMessage::Continue),
                0xFC => Some(MidiMessage::Stop),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | (channel & 0x0F), note, velocity],
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => vec![0x80 | (channel & 0x0F), note, velocity],
            MidiMessage::PolyPressure {
                channel,
                note,
                value,
            } => vec![0xA0 | (channel & 0x0F), note, value],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | (channel & 0x0F), controller, value],
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program]
            }
            MidiMessage::ChannelPressure { channel, value } => {
                vec![0xD0 | (channel & 0x0F), value]
            }
            MidiMessage::PitchBend { channel, value } => {
                let raw = (i32::from(value) + 8192).clamp(0, 0x3FFF) as u16;
                vec![
                    0xE0 | (channel & 0x0F),
                    (raw & 0x7F) as u8,
                    (raw >> 7) as u8,
                ]
            }
            MidiMessage::Clock => vec![0xF8],
            MidiMessage::Start => vec![0xFA],
            MidiMessage::Continue => vec![0xFB],
            MidiMessage::Stop => vec![0xFC],
        }
    }
}

/// An opened destination for MIDI messages (physical, virtual or mock).
pub trait OutputEndpoint: Send {
    fn name(&self) -> &str;

    /// Sends a MIDI message to the device
    fn send(&mut self, msg: &MidiMessage) -> Result<()>;

    /// Closing twice is a no-op.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}
