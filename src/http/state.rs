use crate::orchestrator::TaskOrchestrator;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TaskOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<TaskOrchestrator>) -> Self {
        Self { orchestrator }
    }
}
