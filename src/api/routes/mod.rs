//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] - Submission, polling and archive download
//! - [`system`] - Health, events, OpenAPI

use crate::types::JobId;
use serde::{Deserialize, Serialize};

mod jobs;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use jobs::*;
pub use system::*;

/// Request body for POST /jobs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmitJobRequest {
    /// URL to fetch (http or https)
    pub url: String,
}

/// Response for POST /jobs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmitJobResponse {
    /// Identifier to poll
    pub job_id: JobId,
}
