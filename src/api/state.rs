//! Application state for the API server

use crate::ZipService;
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The service handling submissions, polls and retrievals
    pub service: Arc<ZipService>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(service: Arc<ZipService>) -> Self {
        Self { service }
    }
}
