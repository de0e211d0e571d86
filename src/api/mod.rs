//! REST API server module
//!
//! Thin JSON API over [`ZipService`]: submit a URL, poll its job, download
//! the finished archive.

use crate::{Config, Result, ZipService};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use hyper_util::service::TowerToHyperService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Jobs
/// - `POST /jobs` - Submit a URL
/// - `GET /jobs/:id` - Poll a job
/// - `GET /jobs/:id/archive` - Download the finished archive
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /events` - Server-sent job events
pub fn create_router(service: Arc<ZipService>, config: Arc<Config>) -> Router {
    let state = AppState::new(service);

    let router = Router::new()
        // Jobs
        .route("/jobs", post(routes::submit_job))
        .route("/jobs/:id", get(routes::get_job))
        .route("/jobs/:id/archive", get(routes::download_archive))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream))
        .with_state(state)
        .layer(TimeoutLayer::new(config.server.api.request_timeout))
        .layer(TraceLayer::new_for_http());

    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` anywhere in the list, or an empty list, allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address
///
/// Runs until the service shuts down, then stops accepting connections and
/// drains in-flight requests. Clients that do not finish sending the request
/// head within `header_read_timeout` are disconnected.
///
/// # Example
///
/// ```no_run
/// use zipjit::{Config, ZipService};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let service = Arc::new(ZipService::new((*config).clone()).await?);
///
/// // Start API server (blocks until shutdown)
/// zipjit::api::start_api_server(service, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(service: Arc<ZipService>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.server.api.bind_address;
    let header_read_timeout = config.server.api.header_read_timeout;

    tracing::info!(address = %bind_address, "Starting API server");

    let shutdown = service.shutdown_token.child_token();
    let app = create_router(service, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %listener.local_addr().unwrap_or(bind_address),
        "API server listening"
    );

    let connections = TaskTracker::new();
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            },
            _ = shutdown.cancelled() => break,
        };

        connections.spawn(serve_connection(
            stream,
            peer,
            TowerToHyperService::new(app.clone()),
            header_read_timeout,
            shutdown.clone(),
        ));
    }

    drop(listener);
    connections.close();
    if tokio::time::timeout(DRAIN_TIMEOUT, connections.wait())
        .await
        .is_err()
    {
        tracing::warn!(
            open = connections.len(),
            "connections still open after drain timeout, abandoning them"
        );
    }

    tracing::info!("API server stopped");
    Ok(())
}

/// Pause after a failed `accept` (e.g. out of file descriptors)
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// How long shutdown waits for open connections to finish
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: TowerToHyperService<Router>,
    header_read_timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut builder = ConnectionBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(header_read_timeout);

    let connection = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.cancelled() => {
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    };

    if let Err(e) = result {
        tracing::debug!(peer = %peer, error = %e, "connection closed with error");
    }
}

#[cfg(test)]
mod tests;
