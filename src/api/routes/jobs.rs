//! Job handlers.

use super::{SubmitJobRequest, SubmitJobResponse};
use crate::api::AppState;
use crate::error::Error;
use crate::types::{JobId, JobSnapshot};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

fn parse_job_id(raw: &str) -> Result<JobId, Error> {
    raw.parse().map_err(|_| Error::InvalidJobId(raw.to_string()))
}

/// POST /jobs - Submit a URL
#[utoipa::path(
    post,
    path = "/jobs",
    tag = "jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 201, description = "Job created", body = SubmitJobResponse),
        (status = 400, description = "Missing or malformed URL", body = crate::error::ApiError),
        (status = 422, description = "Destination refused", body = crate::error::ApiError),
        (status = 429, description = "Too many submissions", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<impl IntoResponse, Error> {
    let job_id = state.service.submit(&request.url).await?;
    Ok((StatusCode::CREATED, Json(SubmitJobResponse { job_id })))
}

/// GET /jobs/:id - Poll a job
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job snapshot", body = JobSnapshot),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobSnapshot>, Error> {
    let id = parse_job_id(&id)?;
    let snapshot = state.service.poll_progress(id).await?;
    Ok(Json(snapshot))
}

/// GET /jobs/:id/archive - Download the finished archive
#[utoipa::path(
    get,
    path = "/jobs/{id}/archive",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Double-wrapped archive", content_type = "application/zip"),
        (status = 404, description = "Job not found", body = crate::error::ApiError),
        (status = 409, description = "Job not complete", body = crate::error::ApiError)
    )
)]
pub async fn download_archive(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    let id = parse_job_id(&id)?;
    let download = state.service.retrieve_archive(id).await?;

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download.file_name),
        ),
        (header::CONTENT_LENGTH, download.size.to_string()),
    ];
    let body = Body::from_stream(ReaderStream::new(download.file));

    Ok((StatusCode::OK, headers, body).into_response())
}
