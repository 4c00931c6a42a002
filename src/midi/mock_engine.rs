use crate::midi::{MidiError, MidiMessage, OutputEndpoint, Result};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// In-memory output endpoint that records everything sent to it.
///
/// Clones share the same recording, so a test can keep one handle while the
/// endpoint itself is moved into an output worker.
#[derive(Clone)]
pub struct MockOutput {
    name: String,
    sent: Arc<Mutex<Vec<(Instant, MidiMessage)>>>,
    closed: Arc<Mutex<bool>>,
    fail_sends: bool,
    send_delay: Option<Duration>,
}

impl MockOutput {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(false)),
            fail_sends: false,
            send_delay: None,
        }
    }

    /// An endpoint whose every send fails.
    pub fn failing(name: &str) -> Self {
        Self {
            fail_sends: true,
            ..Self::new(name)
        }
    }

    /// An endpoint that blocks for `delay` on every send.
    pub fn stalled(name: &str, delay: Duration) -> Self {
        Self {
            send_delay: Some(delay),
            ..Self::new(name)
        }
    }

    pub fn sent(&self) -> Vec<MidiMessage> {
        self.sent
            .lock()
            .map(|s| s.iter().map(|(_, msg)| *msg).collect())
            .unwrap_or_default()
    }

    /// Arrival time of every recorded clock pulse.
    pub fn pulse_times(&self) -> Vec<Instant> {
        self.sent
            .lock()
            .map(|s| {
                s.iter()
                    .filter(|(_, msg)| *msg == MidiMessage::Clock)
                    .map(|(at, _)| *at)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Recorded messages other than clock pulses.
    pub fn transport_signals(&self) -> Vec<MidiMessage> {
        self.sent()
            .into_iter()
            .filter(|m| *m != MidiMessage::Clock)
            .collect()
    }

    pub fn pulse_count(&self) -> usize {
        self.sent()
            .iter()
            .filter(|m| **m == MidiMessage::Clock)
            .count()
    }
}

impl OutputEndpoint for MockOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, msg: &MidiMessage) -> Result<()> {
        if let Some(delay) = self.send_delay {
            thread::sleep(delay);
        }
        if self.fail_sends {
            return Err(MidiError::SendError("mock endpoint refuses sends".to_string()));
        }
        if self.is_closed() {
            return Err(MidiError::Closed(self.name.clone()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((Instant::now(), *msg));
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.lock().map(|c| *c).unwrap_or(true)
    }
}
