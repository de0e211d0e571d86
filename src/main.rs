//! zipjit server
//!
//! Usage: `zipjit-server [config.json]`
//!
//! The config path may also come from `ZIPJIT_CONFIG`; without either the
//! defaults are used. Log verbosity follows `RUST_LOG` (default `info`).
//!
//! Once running:
//! - Submit via `POST http://127.0.0.1:9443/jobs` with `{"url": "..."}`
//! - Poll via `GET http://127.0.0.1:9443/jobs/{id}`
//! - Download via `GET http://127.0.0.1:9443/jobs/{id}/archive`
//! - Stream events via `GET http://127.0.0.1:9443/events`

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zipjit::{Config, ZipService, run_with_shutdown};

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "zipjit server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> zipjit::Result<()> {
    let config = match config_path() {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            Config::from_file(&path)?
        }
        None => Config::default(),
    };

    let service = Arc::new(ZipService::new(config).await?);

    let reaper = service.spawn_reaper();
    let mut api = service.spawn_api_server();

    // The API server only returns early when it fails (e.g. cannot bind)
    let api_result = tokio::select! {
        shutdown = run_with_shutdown(&service) => {
            shutdown?;
            api.await
        }
        joined = &mut api => {
            service.shutdown().await?;
            joined
        }
    };

    if let Err(e) = reaper.await {
        tracing::warn!(error = %e, "reaper task ended abnormally");
    }
    match api_result {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(error = %e, "API server task ended abnormally");
            Ok(())
        }
    }
}

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("ZIPJIT_CONFIG").map(PathBuf::from))
}
