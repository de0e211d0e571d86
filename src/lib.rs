//! # zipjit
//!
//! Fetch an arbitrary URL in the background and hand back the body packed in
//! a double-wrapped, password-protected ZIP, together with the MD5 of the
//! original bytes.
//!
//! ## Design Philosophy
//!
//! zipjit is designed to be:
//! - **Hostile-URL safe** - Every destination is checked before the request,
//!   on every redirect and again at connect time, so private networks, cloud
//!   metadata endpoints and DNS rebinding are refused
//! - **Poll-driven** - `submit` returns a job id at once; callers poll a
//!   snapshot (or subscribe to events) until the job is terminal
//! - **Bounded** - Size ceiling, redirect cap and an end-to-end deadline per fetch
//! - **Self-cleaning** - Jobs and their archives expire on a timer
//!
//! ## Quick Start
//!
//! ```no_run
//! use zipjit::{Config, ZipService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ZipService::new(Config::default()).await?;
//!     service.spawn_reaper();
//!
//!     let id = service.submit("https://example.com/report.pdf").await?;
//!
//!     loop {
//!         let snapshot = service.poll_progress(id).await?;
//!         if snapshot.status.is_terminal() {
//!             println!("{:?} md5={:?}", snapshot.status, snapshot.content_md5);
//!             break;
//!         }
//!         tokio::time::sleep(std::time::Duration::from_millis(250)).await;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Admission gate consulted before a job is created
pub mod admission;
/// REST API module
pub mod api;
/// Double-wrap archive encoder
pub mod archive;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Guarded HTTP(S) fetcher
pub mod fetcher;
/// Filename hint derived from the URL
pub mod filename;
/// Address guard and blocked ranges
pub mod guard;
/// Job registry and reaper
pub mod jobs;
/// Service facade (decomposed into focused submodules)
pub mod service;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use admission::{AdmissionGate, AllowAll, TokenBucketGate};
pub use archive::ARCHIVE_PASSWORD;
pub use config::Config;
pub use error::{
    ApiError, ArchiveError, Error, ErrorDetail, FetchError, GuardError, JobError, Result,
    ToHttpStatus,
};
pub use guard::{AddressGuard, HostResolver, StaticResolver, SystemResolver};
pub use jobs::JobRegistry;
pub use service::{ArchiveDownload, ZipService};
pub use types::{JobEvent, JobId, JobSnapshot, JobStatus};

/// Helper function to run the service with graceful signal handling.
///
/// Waits for a termination signal and then calls the service's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use zipjit::{Config, ZipService, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = ZipService::new(Config::default()).await?;
///     service.spawn_reaper();
///
///     run_with_shutdown(&service).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(service: &ZipService) -> Result<()> {
    wait_for_signal().await;
    service.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
