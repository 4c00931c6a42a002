//! MIDI functionality for BeatClock
//!
//! This module provides MIDI communication capabilities, including:
//! - Core MIDI message types, parsing and error handling
//! - Real MIDI device communication via midir
//! - Best-effort fan-out to every open output
//! - Mock endpoints for testing
//!
//! The main components are:
//! - [`OutputEndpoint`] trait for anything that accepts MIDI messages
//! - [`MidirOutput`] / [`MidirInput`] for real MIDI device communication
//! - [`OutputFanout`] for isolated, non-blocking delivery
//! - [`MockOutput`] for testing
mod engine;
pub mod midir_engine;
pub mod mock_engine;
pub mod outputs;

pub use engine::{MessageKind, MidiError, MidiMessage, OutputEndpoint, Result};
pub use midir_engine::{
    find_port_by_substring, list_input_ports, list_output_ports, MidirInput, MidirOutput,
};
pub use mock_engine::MockOutput;
pub use outputs::OutputFanout;
