use std::sync::Arc;

use crate::services::{artifacts::ArtifactStore, dispatcher::Dispatcher, registry::JobRegistry};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub artifacts: Arc<ArtifactStore>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(
        registry: Arc<JobRegistry>,
        artifacts: Arc<ArtifactStore>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            registry,
            artifacts,
            dispatcher: Arc::new(dispatcher),
        }
    }
}
