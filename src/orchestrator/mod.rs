//! Task Orchestrator
//!
//! Runs one speak task at a time: connect the transport lazily, open a
//! recording window, dispatch the text, wait out the estimated duration,
//! then close the window and validate the exported file.

mod orchestrator;
mod state;

pub use orchestrator::{InterruptOutcome, TaskOrchestrator};
pub use state::{OrchestratorStatus, TaskPhase, TaskReport};
