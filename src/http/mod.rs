//! HTTP control API
//!
//! - POST /speak - Run one speak task and return the recorded file
//! - POST /interrupt - Stop the current task
//! - GET /status - Orchestrator, session and recording state
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
