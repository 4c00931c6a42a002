// clock.rs

use crate::config::TICKS_PER_BEAT;
use crate::midi::{MidiMessage, OutputFanout};
use crate::scheduler::ShutdownFlag;
use crate::state::{SharedState, TransportStatus};
use log::{info, trace};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Sleep granularity while not playing.
pub const IDLE_POLL: Duration = Duration::from_millis(10);
/// Wake this much before a pulse is due, then yield until it is.
pub const EARLY_WAKE: Duration = Duration::from_micros(500);

/// Time between two clock pulses at `bpm`.
pub fn pulse_interval(bpm: f64) -> Duration {
    Duration::from_secs_f64(60.0 / (bpm * f64::from(TICKS_PER_BEAT)))
}

/// Anchor-based pulse timing.
///
/// The anchor is the instant the next pulse is due. It advances by exactly
/// one interval per pulse, so sleep jitter never accumulates into drift.
#[derive(Debug, Default)]
pub struct PulseSchedule {
    anchor: Option<Instant>,
}

impl PulseSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the anchor; the next poll pulses immediately.
    pub fn reset(&mut self) {
        self.anchor = None;
    }

    pub fn is_anchored(&self) -> bool {
        self.anchor.is_some()
    }

    /// Returns true if a pulse is due at `now`, advancing the anchor past it.
    pub fn poll(&mut self, now: Instant, interval: Duration) -> bool {
        let anchor = *self.anchor.get_or_insert(now);
        if now >= anchor {
            self.anchor = Some(anchor + interval);
            true
        } else {
            false
        }
    }

    /// Time left until the next pulse is due, zero if it is overdue.
    pub fn until_next(&self, now: Instant) -> Option<Duration> {
        self.anchor
            .map(|anchor| anchor.saturating_duration_since(now))
    }
}

/// Emits 24 clock pulses per quarter note to every output while playing.
///
/// Reads the performance state only; transport changes reach it through the
/// status field, the resync flag and the state's wake signal.
pub struct ClockEngine {
    state: SharedState,
    outputs: Arc<OutputFanout>,
    shutdown: ShutdownFlag,
    schedule: PulseSchedule,
    pulses_sent: u64,
}

impl ClockEngine {
    pub fn new(state: SharedState, outputs: Arc<OutputFanout>, shutdown: ShutdownFlag) -> Self {
        Self {
            state,
            outputs,
            shutdown,
            schedule: PulseSchedule::new(),
            pulses_sent: 0,
        }
    }

    /// Runs until shutdown is requested. Returns the number of pulses sent.
    pub fn run(mut self) -> u64 {
        info!("Clock engine started at {:.2} BPM", self.state.tempo());
        while !self.shutdown.is_set() {
            self.step();
        }
        info!("Clock engine stopped after {} pulses", self.pulses_sent);
        self.pulses_sent
    }

    fn step(&mut self) {
        let status = self.state.status();
        if status != TransportStatus::Playing {
            if status == TransportStatus::Stopped {
                self.schedule.reset();
            }
            self.state.wake().wait_timeout(IDLE_POLL);
            return;
        }

        if self.state.take_resync() {
            trace!("Resync at {:.2} BPM", self.state.tempo());
            self.schedule.reset();
        }

        let interval = pulse_interval(self.state.tempo());
        if self.schedule.poll(Instant::now(), interval) {
            self.outputs.broadcast(MidiMessage::Clock);
            self.pulses_sent += 1;
        }

        match self.schedule.until_next(Instant::now()) {
            Some(gap) if gap > EARLY_WAKE => {
                self.state.wake().wait_timeout(gap - EARLY_WAKE);
            }
            Some(gap) if !gap.is_zero() => thread::yield_now(),
            _ => {}
        }
    }
}
