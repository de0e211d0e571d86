//! Service facade (decomposed into focused submodules)
//!
//! [`ZipService`] is the boundary the REST API and embedding code talk to:
//! `submit`, `poll_progress` and `retrieve_archive`, plus lifecycle helpers
//! in [`lifecycle`].

mod lifecycle;
pub(crate) mod orchestrator;

use crate::admission::{self, AdmissionGate};
use crate::config::Config;
use crate::error::{Error, JobError, Result};
use crate::fetcher::SecureFetcher;
use crate::filename::filename_hint;
use crate::guard::{AddressGuard, HostResolver, SystemResolver};
use crate::jobs::JobRegistry;
use crate::types::{JobEvent, JobId, JobSnapshot};
use orchestrator::{JobArtifacts, JobContext};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// A finished archive ready to be streamed to the caller
#[derive(Debug)]
pub struct ArchiveDownload {
    /// Open handle on the outer archive
    pub file: tokio::fs::File,
    /// Suggested attachment name, `<job id>.zip`
    pub file_name: String,
    /// Archive size in bytes
    pub size: u64,
}

/// Main service instance
///
/// Cheap to clone; every clone shares the same registry, guard and gate.
#[derive(Clone)]
pub struct ZipService {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Job records shared with job tasks and the reaper
    pub(crate) registry: JobRegistry,
    /// Address guard shared by validation and the fetcher
    pub(crate) guard: Arc<AddressGuard>,
    /// Fetcher used by every job
    pub(crate) fetcher: Arc<SecureFetcher>,
    /// Consulted once per submission
    pub(crate) gate: Arc<dyn AdmissionGate>,
    /// Cleared on shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Job tasks still running
    pub(crate) active_jobs: Arc<AtomicUsize>,
    /// Parent token for background tasks
    pub(crate) shutdown_token: CancellationToken,
}

impl std::fmt::Debug for ZipService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipService")
            .field("registry", &self.registry)
            .field("guard", &self.guard)
            .field("accepting_new", &self.accepting_new.load(Ordering::SeqCst))
            .field("active_jobs", &self.active_jobs.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ZipService {
    /// Create a service with the system resolver and the configured admission gate
    pub async fn new(config: Config) -> Result<Self> {
        let gate = admission::gate_from_config(&config.admission);
        Self::with_components(config, Arc::new(SystemResolver), gate).await
    }

    /// Create a service with explicit collaborators
    ///
    /// Embedding code and tests use this to inject a resolver (for example a
    /// [`StaticResolver`](crate::guard::StaticResolver)) or a custom gate.
    pub async fn with_components(
        config: Config,
        resolver: Arc<dyn HostResolver>,
        gate: Arc<dyn AdmissionGate>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(config.temp_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create temp directory '{}': {}",
                        config.temp_dir().display(),
                        e
                    ),
                ))
            })?;

        let guard = Arc::new(AddressGuard::new(&config.guard, resolver));
        let fetcher = Arc::new(SecureFetcher::new(guard.clone(), config.fetch.clone()));

        tracing::info!(
            temp_dir = %config.temp_dir().display(),
            max_file_size = config.fetch.max_file_size,
            max_redirects = config.fetch.max_redirects,
            "zip service initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            registry: JobRegistry::new(),
            guard,
            fetcher,
            gate,
            accepting_new: Arc::new(AtomicBool::new(true)),
            active_jobs: Arc::new(AtomicUsize::new(0)),
            shutdown_token: CancellationToken::new(),
        })
    }

    /// Validate `url`, create a job and start fetching it in the background
    ///
    /// Returns as soon as the job exists. Validation failures, admission
    /// refusals and shutdown are reported here and create no job; everything
    /// after that is recorded on the job itself.
    pub async fn submit(&self, url: &str) -> Result<JobId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let url = url.trim();

        if !self.gate.allow_request() {
            tracing::info!(url, "submission refused by admission gate");
            return Err(Error::RateLimited);
        }

        if url.is_empty() {
            return Err(Error::EmptyUrl);
        }

        let validated = self.guard.validate_url(url).await?;
        let file_name = filename_hint(&validated.url);

        let (id, handle) = self.registry.create(file_name.clone()).await;
        let ctx = JobContext {
            url: validated.url.to_string(),
            file_name,
            artifacts: JobArtifacts::new(self.config.temp_dir(), id),
            fetcher: self.fetcher.clone(),
        };

        self.active_jobs.fetch_add(1, Ordering::SeqCst);
        let active_jobs = self.active_jobs.clone();
        tokio::spawn(async move {
            orchestrator::run(ctx, handle).await;
            active_jobs.fetch_sub(1, Ordering::SeqCst);
        });

        tracing::info!(job_id = %id, url, host = %validated.host, "job submitted");
        Ok(id)
    }

    /// Current snapshot of a job
    pub async fn poll_progress(&self, id: JobId) -> Result<JobSnapshot> {
        Ok(self.registry.get(id).await?)
    }

    /// Open a completed job's archive for streaming
    pub async fn retrieve_archive(&self, id: JobId) -> Result<ArchiveDownload> {
        let path = self.registry.archive_path(id).await?;

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            // Reaped between the lookup and the open
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(JobError::NotFound(id).into());
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();

        tracing::debug!(job_id = %id, size, "archive retrieved");
        Ok(ArchiveDownload {
            file,
            file_name: format!("{id}.zip"),
            size,
        })
    }

    /// Subscribe to job events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.registry.subscribe()
    }

    /// The job registry backing this service
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        self.config.clone()
    }

    /// Number of job tasks still running
    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::SeqCst)
    }
}
