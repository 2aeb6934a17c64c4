//! Application state for the API server

use crate::MediaRelay;
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The relay that runs sessions and metadata lookups
    pub relay: Arc<MediaRelay>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(relay: Arc<MediaRelay>) -> Self {
        Self { relay }
    }
}
