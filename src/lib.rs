pub mod cli;
pub mod clock;
pub mod config;
pub mod event_loop;
pub mod logging;
pub mod midi;
pub mod remote;
pub mod rules;
pub mod scheduler;
pub mod state;
pub mod transport;
pub mod ui;

pub use clock::ClockEngine;
pub use event_loop::{Command, EventLoop, TransportAction};
pub use scheduler::{Scheduler, ShutdownFlag, ThreadScheduler};
pub use state::{PerformanceState, SharedState, TransportStatus};
pub use transport::TransportController;

pub fn create_shared_state(initial_bpm: f64) -> SharedState {
    std::sync::Arc::new(PerformanceState::new(initial_bpm))
}
