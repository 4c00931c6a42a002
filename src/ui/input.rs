use crate::event_loop::{Command, TransportAction};
use crate::state::PerformanceState;
use console::Key;
use log::debug;
use std::sync::{Arc, Mutex};

/// Digits typed so far, shared with the status display.
pub type PendingInput = Arc<Mutex<String>>;

const MAX_DIGITS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    Send(Command),
    Quit,
    Ignored,
}

/// Accumulates typed digits into a tempo value.
#[derive(Debug, Default)]
pub struct TempoEntry {
    pending: PendingInput,
}

impl TempoEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> PendingInput {
        self.pending.clone()
    }

    fn with_buffer<R>(&self, f: impl FnOnce(&mut String) -> R) -> R {
        match self.pending.lock() {
            Ok(mut buffer) => f(&mut *buffer),
            Err(poisoned) => f(&mut *poisoned.into_inner()),
        }
    }

    /// Appends a digit. Returns the tempo once three digits were typed.
    pub fn push_digit(&self, digit: char) -> Option<f64> {
        self.with_buffer(|buffer| {
            buffer.push(digit);
            if buffer.len() >= MAX_DIGITS {
                take_value(buffer)
            } else {
                None
            }
        })
    }

    /// Takes the typed value, if any digits are pending.
    pub fn commit(&self) -> Option<f64> {
        self.with_buffer(take_value)
    }

    pub fn backspace(&self) {
        self.with_buffer(|buffer| {
            buffer.pop();
        });
    }

    pub fn clear(&self) {
        self.with_buffer(String::clear);
    }

    pub fn is_empty(&self) -> bool {
        self.with_buffer(|buffer| buffer.is_empty())
    }
}

fn take_value(buffer: &mut String) -> Option<f64> {
    let value = buffer.parse::<f64>().ok();
    buffer.clear();
    value
}

/// Maps key presses onto commands.
#[derive(Debug, Default)]
pub struct KeyMapper {
    entry: TempoEntry,
}

impl KeyMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> PendingInput {
        self.entry.pending()
    }

    pub fn handle(&mut self, key: Key, state: &PerformanceState) -> KeyOutcome {
        debug!("Key pressed: {:?}", key);
        match key {
            Key::Char(digit) if digit.is_ascii_digit() => {
                if state.is_tempo_locked() {
                    self.entry.clear();
                    state.set_feedback(format!(
                        "BPM locked at {:.2}, ignoring '{}'",
                        state.tempo(),
                        digit
                    ));
                    return KeyOutcome::Ignored;
                }
                match self.entry.push_digit(digit) {
                    Some(bpm) => KeyOutcome::Send(Command::SetTempo(bpm)),
                    None => KeyOutcome::Ignored,
                }
            }
            Key::Enter => match self.entry.commit() {
                Some(bpm) => KeyOutcome::Send(Command::SetTempo(bpm)),
                None => KeyOutcome::Send(Command::Transport(TransportAction::PlayOrStop)),
            },
            Key::Backspace => {
                self.entry.backspace();
                KeyOutcome::Ignored
            }
            Key::Char('+') => KeyOutcome::Send(Command::NudgeTempo(1.0)),
            Key::Char('-') => KeyOutcome::Send(Command::NudgeTempo(-1.0)),
            Key::Char('b') | Key::Char('B') => KeyOutcome::Send(Command::ToggleTempoLock),
            Key::Char(' ') | Key::Char('c') | Key::Char('C') => {
                KeyOutcome::Send(Command::Transport(TransportAction::TogglePlayPause))
            }
            Key::Char('p') | Key::Char('P') => {
                KeyOutcome::Send(Command::Transport(TransportAction::Play))
            }
            Key::Char('s') | Key::Char('S') => {
                KeyOutcome::Send(Command::Transport(TransportAction::StopIfRunning))
            }
            Key::Char('q') | Key::Char('Q') | Key::Escape => KeyOutcome::Quit,
            _ => KeyOutcome::Ignored,
        }
    }
}
