//! Best-effort fan-out of MIDI messages to every open output endpoint.
//!
//! Each endpoint is owned by its own worker thread and fed through a bounded
//! queue. Senders never block: a full queue means the endpoint is stalled
//! and the message is dropped for that endpoint only.

use crate::midi::{MidiMessage, OutputEndpoint};
use crossbeam::channel::{self, Sender, TrySendError};
use log::{debug, error, info, warn};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const QUEUE_DEPTH: usize = 256;

struct OutputWorker {
    name: String,
    tx: Sender<MidiMessage>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct OutputFanout {
    workers: Mutex<Vec<OutputWorker>>,
}

fn process_midi_messages(
    mut endpoint: Box<dyn OutputEndpoint>,
    rx: channel::Receiver<MidiMessage>,
) {
    let name = endpoint.name().to_string();
    debug!("MIDI output worker for '{}' started", name);

    let mut failures: u64 = 0;
    while let Ok(message) = rx.recv() {
        if let Err(e) = endpoint.send(&message) {
            failures += 1;
            // A dead port fails every pulse; warn once.
            if failures == 1 {
                warn!("Failed to send MIDI message to '{}': {}", name, e);
            } else {
                debug!("Failed to send MIDI message to '{}': {}", name, e);
            }
        }
    }

    endpoint.close();
    if failures > 0 {
        info!("MIDI output '{}' stopped after {} failed sends", name, failures);
    }
}

impl OutputFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands `endpoint` to a dedicated worker thread.
    pub fn attach(&self, endpoint: Box<dyn OutputEndpoint>) {
        let name = endpoint.name().to_string();
        let (tx, rx) = channel::bounded(QUEUE_DEPTH);

        let spawned = thread::Builder::new()
            .name(format!("midi-out:{}", name))
            .spawn(move || process_midi_messages(endpoint, rx));

        match spawned {
            Ok(handle) => {
                info!("MIDI output '{}' attached", name);
                if let Ok(mut workers) = self.workers.lock() {
                    workers.push(OutputWorker { name, tx, handle });
                }
            }
            Err(e) => error!("Failed to spawn output worker for '{}': {}", name, e),
        }
    }

    /// Queues `message` for every endpoint. Never blocks and never fails.
    pub fn broadcast(&self, message: MidiMessage) {
        let workers = match self.workers.lock() {
            Ok(workers) => workers,
            Err(poisoned) => poisoned.into_inner(),
        };
        for worker in workers.iter() {
            match worker.tx.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("Output '{}' is stalled, dropping {:?}", worker.name, message)
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Output '{}' is gone, dropping {:?}", worker.name, message)
                }
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.workers
            .lock()
            .map(|w| w.iter().map(|w| w.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.lock().map(|w| w.is_empty()).unwrap_or(true)
    }

    /// Closes every endpoint. Workers drain what is already queued; any that
    /// do not finish within `timeout` are left detached.
    pub fn close_all(&self, timeout: Duration) {
        let workers: Vec<OutputWorker> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };

        let deadline = Instant::now() + timeout;
        for OutputWorker { name, tx, handle } in workers {
            drop(tx);
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("MIDI output '{}' did not close in time", name);
            }
        }
    }
}
