use std::sync::Arc;

use crate::services::orchestrator::Orchestrator;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub gpu_available: bool,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, gpu_available: bool) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            gpu_available,
        }
    }
}
