//! Job registry
//!
//! In-memory `JobId -> record` store shared by the per-job tasks, pollers and
//! the reaper. Only the task holding a job's [`JobHandle`] changes that job's
//! status; everyone else reads snapshots or removes whole records.

mod reaper;

pub use reaper::{spawn_reaper, sweep_orphans};

use crate::error::JobError;
use crate::fetcher::{DownloadProgress, ProgressSink};
use crate::types::{JobEvent, JobId, JobSnapshot, JobStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};

/// Capacity of the job event channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Concurrency-safe job store
#[derive(Clone)]
pub struct JobRegistry {
    records: Arc<RwLock<HashMap<JobId, JobSnapshot>>>,
    events: broadcast::Sender<JobEvent>,
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry").finish_non_exhaustive()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Create a `Pending` job and return the single handle allowed to advance it
    pub async fn create(&self, file_name: impl Into<String>) -> (JobId, JobHandle) {
        let id = JobId::new();
        let record = JobSnapshot {
            id,
            status: JobStatus::Pending,
            progress: Some(0),
            status_text: "Starting...".to_string(),
            bytes_downloaded: 0,
            total_bytes: None,
            content_md5: None,
            file_name: file_name.into(),
            error: None,
            created_at: Utc::now(),
            archive_path: None,
        };

        let event = event_for(&record);
        self.records.write().await.insert(id, record);
        self.events.send(event).ok();

        tracing::debug!(job_id = %id, "job created");
        (
            id,
            JobHandle {
                id,
                registry: self.clone(),
            },
        )
    }

    /// Snapshot of a job
    pub async fn get(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(JobError::NotFound(id))
    }

    /// Location of a completed job's archive
    pub async fn archive_path(&self, id: JobId) -> Result<PathBuf, JobError> {
        let records = self.records.read().await;
        let record = records.get(&id).ok_or(JobError::NotFound(id))?;
        match (&record.status, &record.archive_path) {
            (JobStatus::Complete, Some(path)) => Ok(path.clone()),
            (status, _) => Err(JobError::NotReady {
                id,
                status: *status,
            }),
        }
    }

    /// Number of live records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the registry holds no records
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Subscribe to job events
    ///
    /// Every accepted mutation emits one event. Slow receivers may observe
    /// `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Archive paths currently owned by records
    pub async fn referenced_paths(&self) -> HashSet<PathBuf> {
        self.records
            .read()
            .await
            .values()
            .filter_map(|record| record.archive_path.clone())
            .collect()
    }

    /// Delete every job created more than `max_age` ago, archive first
    ///
    /// Returns the number of records removed. A failed file removal is logged
    /// and does not keep the record alive.
    pub async fn reap(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return 0;
        };

        let expired: Vec<(JobId, Option<PathBuf>)> = self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.created_at < cutoff)
            .map(|record| (record.id, record.archive_path.clone()))
            .collect();

        // Files go first, outside the lock
        for (id, path) in &expired {
            if let Some(path) = path {
                remove_archive(*id, path).await;
            }
        }

        let mut removed = 0;
        let mut late_archives = Vec::new();
        {
            let mut records = self.records.write().await;
            for (id, known) in &expired {
                let Some(record) = records.remove(id) else {
                    continue;
                };
                removed += 1;
                tracing::info!(job_id = %id, "expired job removed");
                // Completed after the first pass
                if let Some(path) = record.archive_path
                    && Some(&path) != known.as_ref()
                {
                    late_archives.push((*id, path));
                }
            }
        }

        for (id, path) in &late_archives {
            remove_archive(*id, path).await;
        }

        removed
    }

    /// Apply `change` to a record and emit an event if it succeeded
    async fn update<F>(&self, id: JobId, change: F) -> Result<(), JobError>
    where
        F: FnOnce(&mut JobSnapshot) -> Result<bool, JobError>,
    {
        let event = {
            let mut records = self.records.write().await;
            let record = records.get_mut(&id).ok_or(JobError::NotFound(id))?;
            if !change(record)? {
                return Ok(());
            }
            event_for(record)
        };
        self.events.send(event).ok();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn backdate(&self, id: JobId, by: Duration) {
        if let Some(record) = self.records.write().await.get_mut(&id) {
            record.created_at -= chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        }
    }
}

async fn remove_archive(id: JobId, path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(job_id = %id, path = %path.display(), error = %e, "failed to remove expired archive");
        }
    }
}

fn event_for(record: &JobSnapshot) -> JobEvent {
    JobEvent {
        id: record.id,
        status: record.status,
        progress: record.progress,
        bytes_downloaded: record.bytes_downloaded,
    }
}

fn transition(record: &mut JobSnapshot, next: JobStatus) -> Result<(), JobError> {
    if !record.status.can_transition_to(next) {
        return Err(JobError::InvalidTransition {
            id: record.id,
            from: record.status,
            to: next,
        });
    }
    record.status = next;
    Ok(())
}

/// Exclusive write access to one job
///
/// Not `Clone`: the task that created the job is its only writer.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    registry: JobRegistry,
}

impl JobHandle {
    /// Job this handle writes to
    pub fn id(&self) -> JobId {
        self.id
    }

    /// `Pending -> Downloading`
    pub async fn start_download(&self) -> Result<(), JobError> {
        self.registry
            .update(self.id, |record| {
                transition(record, JobStatus::Downloading)?;
                record.progress = Some(0);
                record.status_text = "Downloading... 0%".to_string();
                Ok(true)
            })
            .await?;
        tracing::info!(job_id = %self.id, "download started");
        Ok(())
    }

    /// Record download progress; percentages never go backwards
    pub async fn record_progress(&self, progress: DownloadProgress) -> Result<(), JobError> {
        self.registry
            .update(self.id, |record| {
                if record.status != JobStatus::Downloading {
                    return Err(JobError::InvalidTransition {
                        id: record.id,
                        from: record.status,
                        to: JobStatus::Downloading,
                    });
                }

                let bytes = progress.bytes_downloaded.max(record.bytes_downloaded);
                let percent = match (progress.percent(), record.progress) {
                    (Some(new), Some(old)) => Some(new.max(old)),
                    (Some(new), None) => Some(new),
                    (None, _) => None,
                };

                let changed = percent != record.progress
                    || (percent.is_none() && bytes != record.bytes_downloaded);

                record.bytes_downloaded = bytes;
                record.total_bytes = progress.total_bytes;
                record.progress = percent;
                record.status_text = match percent {
                    Some(pct) => format!("Downloading... {pct}%"),
                    None => format!("Downloading... {bytes} bytes"),
                };
                Ok(changed)
            })
            .await
    }

    /// `Downloading -> Zipping`, storing the content hash
    pub async fn start_zipping(&self, content_md5: String) -> Result<(), JobError> {
        self.registry
            .update(self.id, |record| {
                transition(record, JobStatus::Zipping)?;
                record.content_md5 = Some(content_md5);
                record.progress = Some(100);
                record.status_text = "Zipping...".to_string();
                Ok(true)
            })
            .await?;
        tracing::info!(job_id = %self.id, "packaging archive");
        Ok(())
    }

    /// `Zipping -> Complete`, handing the archive over to the registry
    pub async fn complete(&self, archive_path: PathBuf) -> Result<(), JobError> {
        self.registry
            .update(self.id, |record| {
                transition(record, JobStatus::Complete)?;
                record.archive_path = Some(archive_path);
                record.progress = Some(100);
                record.status_text = "Complete".to_string();
                record.error = None;
                Ok(true)
            })
            .await?;
        tracing::info!(job_id = %self.id, "job complete");
        Ok(())
    }

    /// Any live status `-> Failed`
    pub async fn fail(&self, message: impl Into<String>) -> Result<(), JobError> {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "unknown error".to_string();
        }
        let logged = message.clone();

        self.registry
            .update(self.id, |record| {
                transition(record, JobStatus::Failed)?;
                record.archive_path = None;
                record.status_text = "Failed".to_string();
                record.error = Some(message);
                Ok(true)
            })
            .await?;
        tracing::warn!(job_id = %self.id, error = %logged, "job failed");
        Ok(())
    }
}

#[async_trait]
impl ProgressSink for JobHandle {
    async fn report(&self, progress: DownloadProgress) {
        if let Err(e) = self.record_progress(progress).await {
            tracing::debug!(job_id = %self.id, error = %e, "progress update dropped");
        }
    }
}
