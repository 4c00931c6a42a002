//! User interface components
//!
//! This module provides the terminal surface for BeatClock, including:
//! - A status line with transport, tempo, lock, pending input and outputs
//! - Transient feedback messages
//! - The keyboard command surface
//!
//! The status line is built using the indicatif library.

pub mod input;
mod progress;

pub use input::{KeyMapper, KeyOutcome, PendingInput, TempoEntry};

use crate::scheduler::ShutdownFlag;
use crate::state::{SharedState, Snapshot};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget};
use std::thread;
use std::time::Duration;

/// How long a feedback message stays on screen.
pub const FEEDBACK_TTL: Duration = Duration::from_secs(3);
const REFRESH: Duration = Duration::from_millis(100);

pub fn status_line(snapshot: &Snapshot, pending: &str, outputs: &[String]) -> String {
    let mut line = format!("{} | BPM: {:.2}", snapshot.status, snapshot.tempo_bpm);
    if snapshot.tempo_locked {
        line.push_str(" [LOCKED]");
    }
    if !pending.is_empty() {
        line.push_str(&format!(" | Input: {}_", pending));
    }
    if outputs.is_empty() {
        line.push_str(" | Out: (none)");
    } else {
        line.push_str(&format!(" | Out: {}", outputs.join(", ")));
    }
    line
}

pub struct StatusDisplay {
    state: SharedState,
    pending: PendingInput,
    outputs: Vec<String>,
    shutdown: ShutdownFlag,

    #[allow(dead_code)]
    multi_progress: MultiProgress,
    status_pb: ProgressBar,
    help_pb: ProgressBar,
}

impl StatusDisplay {
    pub fn new(
        state: SharedState,
        pending: PendingInput,
        outputs: Vec<String>,
        shutdown: ShutdownFlag,
    ) -> Self {
        let multi_progress = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        let status_pb = progress::create_status_spinner(&multi_progress);
        let help_pb = progress::create_help_line(&multi_progress);

        StatusDisplay {
            state,
            pending,
            outputs,
            shutdown,
            multi_progress,
            status_pb,
            help_pb,
        }
    }

    fn render(&self) -> String {
        let pending = self
            .pending
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default();
        let mut line = status_line(&self.state.snapshot(), &pending, &self.outputs);
        if let Some(feedback) = self.state.feedback(FEEDBACK_TTL) {
            line.push_str(&format!(" | {}", feedback));
        }
        line
    }

    pub fn run(&self) {
        while !self.shutdown.is_set() {
            self.status_pb.set_message(self.render());
            self.status_pb.tick();
            self.help_pb.tick();
            thread::sleep(REFRESH);
        }
        self.status_pb.finish_and_clear();
        self.help_pb.finish_and_clear();
    }
}
