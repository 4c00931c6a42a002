use crate::midi::{MidiMessage, OutputFanout};
use crate::state::{clamp_tempo, SharedState, TransportStatus};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard};

/// Receives committed transport and tempo changes, e.g. to mirror them to a
/// remote control surface. Implementations must not block.
pub trait StatusNotifier: Send + Sync {
    fn status_changed(&self, status: TransportStatus);
    fn tempo_changed(&self, bpm: f64);
}

/// The only writer of [`PerformanceState`](crate::state::PerformanceState).
///
/// Operations are serialized by an internal commit lock, so concurrent
/// callers observe a last-writer-wins outcome. The lock is never held while
/// waiting on I/O: transport signals are queued on the output fan-out.
pub struct TransportController {
    state: SharedState,
    outputs: Arc<OutputFanout>,
    notifier: Option<Arc<dyn StatusNotifier>>,
    commit: Mutex<()>,
}

impl TransportController {
    pub fn new(state: SharedState, outputs: Arc<OutputFanout>) -> Self {
        Self {
            state,
            outputs,
            notifier: None,
            commit: Mutex::new(()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn StatusNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        match self.commit.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn feedback(&self, message: String) {
        info!("{}", message);
        self.state.set_feedback(message);
    }

    fn notify_status(&self, status: TransportStatus) {
        if let Some(notifier) = &self.notifier {
            notifier.status_changed(status);
        }
    }

    fn notify_tempo(&self, bpm: f64) {
        if let Some(notifier) = &self.notifier {
            notifier.tempo_changed(bpm);
        }
    }

    /// Start from Stopped, continue from Paused, nothing if already playing.
    pub fn play(&self) {
        let _guard = self.lock();
        match self.state.status() {
            TransportStatus::Stopped => {
                self.outputs.broadcast(MidiMessage::Start);
                self.state.request_resync();
                self.state.set_status(TransportStatus::Playing);
                self.feedback("PLAYING".to_string());
            }
            TransportStatus::Paused => {
                self.outputs.broadcast(MidiMessage::Continue);
                self.state.request_resync();
                self.state.set_status(TransportStatus::Playing);
                self.feedback("PLAYING (continued)".to_string());
            }
            TransportStatus::Playing => {
                debug!("Play requested while already playing");
                self.feedback("Already PLAYING".to_string());
            }
        }
        self.notify_status(TransportStatus::Playing);
    }

    pub fn pause(&self) {
        let _guard = self.lock();
        if self.state.status() != TransportStatus::Playing {
            debug!("Pause ignored in state {}", self.state.status());
            return;
        }
        self.outputs.broadcast(MidiMessage::Stop);
        self.state.set_status(TransportStatus::Paused);
        self.feedback("PAUSED".to_string());
        self.notify_status(TransportStatus::Paused);
    }

    /// Always re-emits the stop signal, whatever the current state.
    pub fn stop(&self) {
        let _guard = self.lock();
        self.outputs.broadcast(MidiMessage::Stop);
        self.state.set_status(TransportStatus::Stopped);
        self.feedback("STOPPED".to_string());
        self.notify_status(TransportStatus::Stopped);
    }

    /// Plays only when paused.
    pub fn continue_playback(&self) {
        if self.state.status() == TransportStatus::Paused {
            self.play();
        }
    }

    pub fn set_tempo(&self, bpm: f64) {
        let _guard = self.lock();
        self.commit_tempo(bpm);
    }

    /// Moves the tempo by `delta` relative to the value current at commit time.
    pub fn nudge_tempo(&self, delta: f64) {
        let _guard = self.lock();
        let target = self.state.tempo() + delta;
        self.commit_tempo(target);
    }

    fn commit_tempo(&self, bpm: f64) {
        let previous = self.state.tempo();
        if self.state.is_tempo_locked() {
            self.feedback(format!("BPM locked at {:.2}", previous));
            return;
        }
        if bpm.is_nan() {
            self.feedback(format!("Invalid BPM value: {}", bpm));
            return;
        }

        let clamped = clamp_tempo(bpm);
        if clamped == previous {
            return;
        }
        self.state.set_tempo(clamped);
        self.state.request_resync();
        self.feedback(format!("BPM: {:.2} -> {:.2}", previous, clamped));
        self.notify_tempo(clamped);
    }

    pub fn toggle_tempo_lock(&self) -> bool {
        let _guard = self.lock();
        let locked = !self.state.is_tempo_locked();
        self.state.set_tempo_locked(locked);
        let label = if locked { "LOCKED" } else { "UNLOCKED" };
        self.feedback(format!("BPM control: {}", label));
        locked
    }

    /// All Notes Off on every channel, sent before the outputs are closed.
    pub fn panic(&self) {
        for channel in 0..16 {
            self.outputs.broadcast(MidiMessage::ControlChange {
                channel,
                controller: 123,
                value: 0,
            });
        }
    }
}
