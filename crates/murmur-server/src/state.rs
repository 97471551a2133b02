//! Application state for the API server.

use std::sync::Arc;

use murmur_updater::Updater;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The self-update orchestrator.
    pub updater: Arc<Updater>,
}

impl AppState {
    /// Creates application state around an updater.
    pub fn new(updater: Updater) -> Self {
        Self {
            updater: Arc::new(updater),
        }
    }
}
