//! Core types for zipjit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identifier for a job
///
/// Generated from a random UUID at creation time and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a fresh, random JobId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Job status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, fetch not started yet
    Pending,
    /// Streaming the remote body to disk
    Downloading,
    /// Packaging the fetched bytes
    Zipping,
    /// Archive written and ready for retrieval
    Complete,
    /// Failed with error
    Failed,
}

impl JobStatus {
    /// Whether no further transition can happen from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`
    ///
    /// The success path is `Pending -> Downloading -> Zipping -> Complete`;
    /// any non-terminal status may move to `Failed`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (from, JobStatus::Failed) => !from.is_terminal(),
            (JobStatus::Pending, JobStatus::Downloading) => true,
            (JobStatus::Downloading, JobStatus::Zipping) => true,
            (JobStatus::Zipping, JobStatus::Complete) => true,
            _ => false,
        }
    }

    /// Lowercase name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Zipping => "zipping",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable point-in-time copy of a job record
///
/// Pollers only ever see snapshots; the live record stays inside the registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobSnapshot {
    /// Job identifier
    pub id: JobId,

    /// Current status
    pub status: JobStatus,

    /// Percentage complete (0-100)
    ///
    /// `None` while downloading a body whose length the server did not declare.
    pub progress: Option<u8>,

    /// Human-readable phase description ("Downloading... 42%", "Zipping...", ...)
    pub status_text: String,

    /// Bytes of the body written to disk so far
    pub bytes_downloaded: u64,

    /// Declared body length, if the server sent one
    pub total_bytes: Option<u64>,

    /// Hex MD5 of the fetched body, set once the download finished
    pub content_md5: Option<String>,

    /// Sanitized name of the entry inside the inner archive
    pub file_name: String,

    /// Failure description, set only when `status` is `failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// Location of the finished archive, set only when `status` is `complete`
    #[serde(skip)]
    pub archive_path: Option<PathBuf>,
}

/// Notification emitted by the registry after every accepted job mutation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobEvent {
    /// Job the event belongs to
    pub id: JobId,
    /// Status after the mutation
    pub status: JobStatus,
    /// Progress after the mutation
    pub progress: Option<u8>,
    /// Bytes downloaded after the mutation
    pub bytes_downloaded: u64,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_round_trips_through_display() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn job_id_rejects_garbage() {
        assert!("not-a-job".parse::<JobId>().is_err());
    }

    #[test]
    fn job_ids_are_unique() {
        let ids: std::collections::HashSet<JobId> = (0..1000).map(|_| JobId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn success_path_transitions_are_allowed() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Downloading));
        assert!(JobStatus::Downloading.can_transition_to(JobStatus::Zipping));
        assert!(JobStatus::Zipping.can_transition_to(JobStatus::Complete));
    }

    #[test]
    fn any_live_status_can_fail() {
        for status in [
            JobStatus::Pending,
            JobStatus::Downloading,
            JobStatus::Zipping,
        ] {
            assert!(status.can_transition_to(JobStatus::Failed), "{status}");
        }
    }

    #[test]
    fn terminal_statuses_are_final() {
        for terminal in [JobStatus::Complete, JobStatus::Failed] {
            assert!(terminal.is_terminal());
            for next in [
                JobStatus::Pending,
                JobStatus::Downloading,
                JobStatus::Zipping,
                JobStatus::Complete,
                JobStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn skipping_phases_is_rejected() {
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Zipping));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Complete));
        assert!(!JobStatus::Downloading.can_transition_to(JobStatus::Complete));
        assert!(!JobStatus::Zipping.can_transition_to(JobStatus::Downloading));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
    }

    #[test]
    fn snapshot_never_serializes_archive_path() {
        let snapshot = JobSnapshot {
            id: JobId::new(),
            status: JobStatus::Complete,
            progress: Some(100),
            status_text: "Complete".into(),
            bytes_downloaded: 5,
            total_bytes: Some(5),
            content_md5: Some("5d41402abc4b2a76b9719d911017c592".into()),
            file_name: "hello.txt".into(),
            error: None,
            created_at: Utc::now(),
            archive_path: Some(PathBuf::from("/srv/temp/download_x.zip")),
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("archive_path").is_none());
        assert!(json.get("error").is_none());
        assert_eq!(json["status"], "complete");
        assert_eq!(json["progress"], 100);
    }
}
