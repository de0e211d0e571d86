//! Periodic cleanup of expired jobs and orphaned temp files

use super::JobRegistry;
use crate::config::JobConfig;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

/// Spawn the reaper loop
///
/// Each tick removes jobs older than `config.max_age` (archive first, then the
/// record) and then deletes unreferenced files in `config.temp_dir` older
/// than `config.orphan_max_age`. The loop exits when `cancel` fires.
pub fn spawn_reaper(
    registry: JobRegistry,
    config: JobConfig,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.reap_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately
        interval.tick().await;

        tracing::info!(
            interval_secs = config.reap_interval.as_secs(),
            max_age_secs = config.max_age.as_secs(),
            "reaper started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let reaped = registry.reap(config.max_age).await;
                    let swept = sweep_orphans(&registry, &config.temp_dir, config.orphan_max_age).await;
                    if reaped > 0 || swept > 0 {
                        tracing::info!(reaped, swept, "reaper pass finished");
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("reaper stopped");
                    break;
                }
            }
        }
    })
}

/// Delete files in `dir` older than `max_age` that no job record references
///
/// Returns the number of files removed. Subdirectories are left alone.
pub async fn sweep_orphans(registry: &JobRegistry, dir: &Path, max_age: Duration) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to scan temp directory");
            return 0;
        }
    };

    let referenced = registry.referenced_paths().await;
    let now = SystemTime::now();
    let mut removed = 0;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to read temp directory entry");
                break;
            }
        };

        let path = entry.path();
        if referenced.contains(&path) {
            continue;
        }

        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age <= max_age {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "removed orphaned file");
                removed += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove orphaned file");
            }
        }
    }

    removed
}
