//! Transport functionality
//!
//! This module handles the transport aspects of BeatClock, including:
//! - Transport state transitions (play, pause, stop)
//! - Tempo commits, tempo lock and the resync signal for the clock
//! - Start/Stop/Continue signal emission to every output
//!
//! [`TransportController`] is the only path through which transport status
//! and tempo change; keyboard, MIDI rules and remote control all end here.

mod controller;

pub use controller::{StatusNotifier, TransportController};
