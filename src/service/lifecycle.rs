//! Background task startup and graceful shutdown.

use crate::error::Result;
use crate::jobs;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::ZipService;

/// How long shutdown waits for in-flight jobs
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl ZipService {
    /// Start the reaper background task
    ///
    /// The task stops when [`shutdown`](Self::shutdown) is called.
    pub fn spawn_reaper(&self) -> tokio::task::JoinHandle<()> {
        jobs::spawn_reaper(
            self.registry.clone(),
            self.config.jobs.clone(),
            self.shutdown_token.child_token(),
        )
    }

    /// Spawn the REST API server in a background task
    ///
    /// The server stops accepting connections when
    /// [`shutdown`](Self::shutdown) is called.
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let service = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(service, config).await })
    }

    /// Gracefully shut down the service
    ///
    /// 1. Stops accepting new submissions
    /// 2. Cancels the reaper and the API server
    /// 3. Waits up to 30 seconds for in-flight jobs to reach a terminal state
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        self.shutdown_token.cancel();

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All in-flight jobs finished"),
            Err(_) => tracing::warn!(
                active_jobs = self.active_jobs.load(Ordering::SeqCst),
                "Timeout waiting for jobs to finish, proceeding with shutdown"
            ),
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether new submissions are still accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active = self.active_jobs.load(Ordering::SeqCst);
            if active == 0 {
                return;
            }
            tracing::debug!(active, "Waiting for in-flight jobs");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
