// event_loop.rs

use crate::midi::MidiMessage;
use crate::rules::{Dispatch, RuleEngine};
use crate::scheduler::ShutdownFlag;
use crate::state::TransportStatus;
use crate::transport::TransportController;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, trace};
use std::sync::Arc;
use std::time::Duration;

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAction {
    Play,
    Pause,
    Stop,
    /// Play only when paused.
    Continue,
    /// Pause when playing, play otherwise.
    TogglePlayPause,
    /// Stop when playing or paused, play when stopped.
    PlayOrStop,
    /// Stop unless already stopped.
    StopIfRunning,
}

/// Everything that can change the performance, whatever its source.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Transport(TransportAction),
    SetTempo(f64),
    NudgeTempo(f64),
    ToggleTempoLock,
    /// An event received from the named input device.
    Midi { message: MidiMessage, port: String },
    Shutdown,
}

/// Sets the shutdown flag and wakes the event loop with a `Shutdown`
/// command. Safe to call more than once or after the loop has exited.
pub fn request_shutdown(commands: &Sender<Command>, shutdown: &ShutdownFlag) {
    shutdown.trigger();
    let _ = commands.send(Command::Shutdown);
}

/// The single consumer of the command channel. Commands are applied one at
/// a time, in arrival order.
pub struct EventLoop {
    commands: Receiver<Command>,
    transport: Arc<TransportController>,
    rules: RuleEngine,
    shutdown: ShutdownFlag,
}

impl EventLoop {
    pub fn new(
        commands: Receiver<Command>,
        transport: Arc<TransportController>,
        rules: RuleEngine,
        shutdown: ShutdownFlag,
    ) -> Self {
        EventLoop {
            commands,
            transport,
            rules,
            shutdown,
        }
    }

    pub fn run(&self) {
        info!("Event loop started with {} rules", self.rules.rules().len());
        while !self.shutdown.is_set() {
            match self.commands.recv_timeout(RECV_TIMEOUT) {
                Ok(Command::Shutdown) => {
                    info!("Shutdown requested");
                    self.shutdown.trigger();
                }
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Command channel closed");
                    break;
                }
            }
        }
        info!("Event loop stopped");
    }

    pub fn handle(&self, command: Command) {
        trace!("Handling {:?}", command);
        match command {
            Command::Transport(action) => self.apply(action),
            Command::SetTempo(bpm) => self.transport.set_tempo(bpm),
            Command::NudgeTempo(delta) => self.transport.nudge_tempo(delta),
            Command::ToggleTempoLock => {
                self.transport.toggle_tempo_lock();
            }
            Command::Midi { message, port } => {
                if let Dispatch::Matched(index) =
                    self.rules.dispatch(&message, &port, &self.transport)
                {
                    debug!("'{}' {:?} handled by rule {}", port, message, index);
                }
            }
            Command::Shutdown => self.shutdown.trigger(),
        }
    }

    fn apply(&self, action: TransportAction) {
        let status = self.transport.state().status();
        match action {
            TransportAction::Play => self.transport.play(),
            TransportAction::Pause => self.transport.pause(),
            TransportAction::Stop => self.transport.stop(),
            TransportAction::Continue => self.transport.continue_playback(),
            TransportAction::TogglePlayPause => {
                if status == TransportStatus::Playing {
                    self.transport.pause();
                } else {
                    self.transport.play();
                }
            }
            TransportAction::PlayOrStop => {
                if status == TransportStatus::Stopped {
                    self.transport.play();
                } else {
                    self.transport.stop();
                }
            }
            TransportAction::StopIfRunning => {
                if status != TransportStatus::Stopped {
                    self.transport.stop();
                }
            }
        }
    }
}
