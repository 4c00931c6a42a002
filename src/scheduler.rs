use log::{debug, error, warn};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Cooperative stop request shared by every worker thread.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Blocks until the flag is set, checking every `poll`.
    pub fn wait(&self, poll: Duration) {
        while !self.is_set() {
            thread::sleep(poll);
        }
    }
}

pub trait Scheduler {
    fn spawn<F>(&self, name: &str, f: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static;
}

/// Spawns named OS threads and keeps their handles for a bounded join.
#[derive(Default)]
pub struct ThreadScheduler {
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(&self) -> usize {
        self.handles
            .lock()
            .map(|handles| handles.iter().filter(|(_, h)| !h.is_finished()).count())
            .unwrap_or(0)
    }

    /// Joins every spawned thread, waiting at most `timeout` overall.
    /// Returns the names of threads that were still running and got abandoned.
    pub fn join_all(&self, timeout: Duration) -> Vec<String> {
        let mut pending = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let deadline = Instant::now() + timeout;

        loop {
            let (finished, running): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|(_, h)| h.is_finished());
            for (name, handle) in finished {
                match handle.join() {
                    Ok(()) => debug!("Thread '{}' joined", name),
                    Err(_) => error!("Thread '{}' panicked", name),
                }
            }
            pending = running;
            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        pending
            .into_iter()
            .map(|(name, _)| {
                warn!("Thread '{}' did not stop within {:?}", name, timeout);
                name
            })
            .collect()
    }
}

impl Scheduler for ThreadScheduler {
    fn spawn<F>(&self, name: &str, f: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_string()).spawn(f)?;
        debug!("Spawned thread '{}'", name);
        match self.handles.lock() {
            Ok(mut handles) => handles.push((name.to_string(), handle)),
            Err(poisoned) => poisoned.into_inner().push((name.to_string(), handle)),
        }
        Ok(())
    }
}
