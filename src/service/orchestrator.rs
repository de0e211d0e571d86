//! Per-job background task
//!
//! Drives one job from `Pending` to a terminal state: fetch, hash, package,
//! complete. Every failure, panics included, ends as `Failed`, and the task
//! removes whatever temp files it created that the registry does not own.

use crate::archive::{self, inner_archive_path};
use crate::error::{ArchiveError, FetchError, JobError};
use crate::fetcher::SecureFetcher;
use crate::jobs::JobHandle;
use crate::types::JobId;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Generic message recorded when the task panics
pub(crate) const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// Temp files belonging to one job
#[derive(Clone, Debug)]
pub(crate) struct JobArtifacts {
    /// Raw fetched body
    pub download: PathBuf,
    /// Final double-wrapped archive
    pub archive: PathBuf,
}

impl JobArtifacts {
    pub(crate) fn new(temp_dir: &Path, id: JobId) -> Self {
        Self {
            download: temp_dir.join(format!("download_{id}")),
            archive: temp_dir.join(format!("download_{id}.zip")),
        }
    }
}

/// Everything a job task needs besides its handle
pub(crate) struct JobContext {
    pub url: String,
    pub file_name: String,
    pub artifacts: JobArtifacts,
    pub fetcher: Arc<SecureFetcher>,
}

#[derive(Debug, Error)]
enum JobFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("archive creation failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Job(#[from] JobError),
}

impl JobFailure {
    fn public_message(&self) -> String {
        match self {
            JobFailure::Fetch(e) => e.public_message(),
            JobFailure::Archive(_) => "archive creation failed".to_string(),
            JobFailure::Job(e) => e.to_string(),
        }
    }
}

/// Run the job to completion; never returns an error and never panics outward
pub(crate) async fn run(ctx: JobContext, handle: JobHandle) {
    let id = handle.id();

    let outcome = AssertUnwindSafe(process(&ctx, &handle)).catch_unwind().await;
    let completed = matches!(outcome, Ok(Ok(())));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(failure)) => {
            tracing::error!(job_id = %id, url = %ctx.url, error = %failure, "job failed");
            record_failure(&handle, failure.public_message()).await;
        }
        Err(panic) => {
            tracing::error!(job_id = %id, url = %ctx.url, panic = %panic_message(&*panic), "job task panicked");
            record_failure(&handle, INTERNAL_ERROR_MESSAGE).await;
        }
    }

    cleanup(&ctx.artifacts, completed).await;
}

async fn process(ctx: &JobContext, handle: &JobHandle) -> Result<(), JobFailure> {
    handle.start_download().await?;

    let content_md5 = ctx
        .fetcher
        .fetch(&ctx.url, &ctx.artifacts.download, handle)
        .await?;

    handle.start_zipping(content_md5).await?;

    archive::double_wrap(&ctx.artifacts.download, &ctx.artifacts.archive, &ctx.file_name)
        .await?;
    remove_if_present(&ctx.artifacts.download).await;

    handle.complete(ctx.artifacts.archive.clone()).await?;
    Ok(())
}

async fn record_failure(handle: &JobHandle, message: impl Into<String>) {
    if let Err(e) = handle.fail(message).await {
        // Already terminal or reaped
        tracing::debug!(job_id = %handle.id(), error = %e, "could not record job failure");
    }
}

async fn cleanup(artifacts: &JobArtifacts, completed: bool) {
    remove_if_present(&artifacts.download).await;
    remove_if_present(&inner_archive_path(&artifacts.archive)).await;
    if !completed {
        remove_if_present(&artifacts.archive).await;
    }
}

async fn remove_if_present(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove temp file");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FetchConfig, GuardConfig};
    use crate::guard::{AddressGuard, StaticResolver};
    use crate::jobs::JobRegistry;
    use crate::types::JobStatus;

    fn context(temp_dir: &Path, id: JobId, url: String) -> JobContext {
        let guard = AddressGuard::new(
            &GuardConfig {
                exempt_addresses: vec!["127.0.0.1".parse().unwrap()],
            },
            Arc::new(StaticResolver::new()),
        );
        JobContext {
            url,
            file_name: "hello.txt".to_string(),
            artifacts: JobArtifacts::new(temp_dir, id),
            fetcher: Arc::new(SecureFetcher::new(Arc::new(guard), FetchConfig::default())),
        }
    }

    #[test]
    fn artifacts_are_named_after_the_job() {
        let id = JobId::new();
        let artifacts = JobArtifacts::new(Path::new("/srv/temp"), id);
        assert_eq!(
            artifacts.download,
            PathBuf::from(format!("/srv/temp/download_{id}"))
        );
        assert_eq!(
            artifacts.archive,
            PathBuf::from(format!("/srv/temp/download_{id}.zip"))
        );
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(&*payload), "kaboom");
        let payload: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }

    #[tokio::test]
    async fn fetch_failure_marks_job_failed_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let (id, handle) = registry.create("hello.txt").await;

        // Nothing listens on port 9 of this address; the guard rejects it first anyway
        let ctx = context(dir.path(), id, "http://10.0.0.1:9/x".to_string());
        let artifacts = ctx.artifacts.clone();
        run(ctx, handle).await;

        let snapshot = registry.get(id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("access to host denied: 10.0.0.1 resolves to a blocked address")
        );
        assert!(!artifacts.download.exists());
        assert!(!artifacts.archive.exists());
    }

    #[tokio::test]
    async fn job_reaped_mid_flight_leaves_no_archive() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_bytes(b"hello".to_vec())
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let (id, handle) = registry.create("hello.txt").await;
        let ctx = context(dir.path(), id, format!("{}/hello.txt", server.uri()));
        let artifacts = ctx.artifacts.clone();

        let task = tokio::spawn(run(ctx, handle));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        registry.reap(std::time::Duration::ZERO).await;
        task.await.unwrap();

        assert!(registry.get(id).await.is_err());
        assert!(!artifacts.download.exists());
        assert!(!artifacts.archive.exists());
        assert!(!inner_archive_path(&artifacts.archive).exists());
    }
}
