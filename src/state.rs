use crate::config::{MAX_BPM, MIN_BPM};
use crossbeam::atomic::AtomicCell;
use crossbeam::channel::{self, Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Stopped,
    Playing,
    Paused,
}

impl TransportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportStatus::Stopped => "STOPPED",
            TransportStatus::Playing => "PLAYING",
            TransportStatus::Paused => "PAUSED",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            TransportStatus::Stopped => 0,
            TransportStatus::Playing => 1,
            TransportStatus::Paused => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => TransportStatus::Playing,
            2 => TransportStatus::Paused,
            _ => TransportStatus::Stopped,
        }
    }
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn clamp_tempo(bpm: f64) -> f64 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// Capacity-one wake-up signal. Notifying an already notified signal is a
/// no-op, so any number of notifications before a wait collapse into one.
pub struct WakeSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Default for WakeSignal {
    fn default() -> Self {
        let (tx, rx) = channel::bounded(1);
        Self { tx, rx }
    }
}

impl WakeSignal {
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }

    /// Blocks for at most `timeout`. Returns true if woken by a notification.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }
}

/// Point-in-time copy of the transport fields, for display and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub status: TransportStatus,
    pub tempo_bpm: f64,
    pub tempo_locked: bool,
}

struct Feedback {
    message: String,
    at: Instant,
}

/// The single authoritative performance record of a running instance.
///
/// Every field is readable lock-free. Writes are crate-private: only the
/// [`TransportController`](crate::transport::TransportController) commits
/// status, tempo and lock changes.
pub struct PerformanceState {
    status: AtomicU8,
    tempo: AtomicCell<f64>,
    tempo_locked: AtomicBool,
    resync: AtomicBool,
    wake: WakeSignal,
    feedback: Mutex<Option<Feedback>>,
}

pub type SharedState = Arc<PerformanceState>;

impl Default for PerformanceState {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BPM)
    }
}

impl PerformanceState {
    pub fn new(initial_bpm: f64) -> Self {
        let bpm = if !initial_bpm.is_nan() {
            clamp_tempo(initial_bpm)
        } else {
            crate::config::DEFAULT_BPM
        };
        Self {
            status: AtomicU8::new(TransportStatus::Stopped.to_u8()),
            tempo: AtomicCell::new(bpm),
            tempo_locked: AtomicBool::new(false),
            resync: AtomicBool::new(false),
            wake: WakeSignal::default(),
            feedback: Mutex::new(None),
        }
    }

    pub fn status(&self) -> TransportStatus {
        TransportStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn tempo(&self) -> f64 {
        self.tempo.load()
    }

    pub fn is_tempo_locked(&self) -> bool {
        self.tempo_locked.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status(),
            tempo_bpm: self.tempo(),
            tempo_locked: self.is_tempo_locked(),
        }
    }

    pub(crate) fn set_status(&self, status: TransportStatus) {
        self.status.store(status.to_u8(), Ordering::SeqCst);
        self.wake.notify();
    }

    pub(crate) fn set_tempo(&self, bpm: f64) {
        self.tempo.store(clamp_tempo(bpm));
    }

    pub(crate) fn set_tempo_locked(&self, locked: bool) {
        self.tempo_locked.store(locked, Ordering::SeqCst);
    }

    /// Raises the edge-triggered "tempo changed" flag and wakes the clock.
    pub(crate) fn request_resync(&self) {
        self.resync.store(true, Ordering::SeqCst);
        self.wake.notify();
    }

    /// Consumes the resync flag. Returns whether it was raised.
    pub fn take_resync(&self) -> bool {
        self.resync.swap(false, Ordering::SeqCst)
    }

    pub fn wake(&self) -> &WakeSignal {
        &self.wake
    }

    pub(crate) fn set_feedback(&self, message: impl Into<String>) {
        let feedback = Feedback {
            message: message.into(),
            at: Instant::now(),
        };
        match self.feedback.lock() {
            Ok(mut slot) => *slot = Some(feedback),
            Err(poisoned) => *poisoned.into_inner() = Some(feedback),
        }
    }

    /// The latest feedback message, if it is younger than `max_age`.
    pub fn feedback(&self, max_age: Duration) -> Option<String> {
        let slot = self.feedback.lock().ok()?;
        slot.as_ref()
            .filter(|f| f.at.elapsed() < max_age)
            .map(|f| f.message.clone())
    }
}
