//! OpenAPI documentation and schema generation

use utoipa::OpenApi;

/// OpenAPI documentation for the zipjit REST API
///
/// Served as JSON at `/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "zipjit REST API",
        version = "0.1.0",
        description = "Submit a URL, poll the fetch, download the double-wrapped encrypted archive",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:9443", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::submit_job,
        crate::api::routes::get_job,
        crate::api::routes::download_archive,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(
        schemas(
            crate::types::JobId,
            crate::types::JobStatus,
            crate::types::JobSnapshot,
            crate::types::JobEvent,
            crate::error::ApiError,
            crate::error::ErrorDetail,
            crate::api::routes::SubmitJobRequest,
            crate::api::routes::SubmitJobResponse,
        )
    ),
    tags(
        (name = "jobs", description = "Fetch jobs and their archives"),
        (name = "system", description = "Health, events and API documentation")
    )
)]
pub struct ApiDoc;
