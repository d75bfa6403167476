//! Application state.

use conveyor_engine::BuildQueue;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<BuildQueue>,
}

impl AppState {
    pub fn new(queue: Arc<BuildQueue>) -> Self {
        Self { queue }
    }
}
