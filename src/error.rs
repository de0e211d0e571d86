//! Error types for zipjit
//!
//! This module provides:
//! - Domain-specific error types (address guard, fetch, archive, job registry)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes
//! - Short, non-sensitive summaries for errors surfaced to pollers

use crate::types::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for zipjit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for zipjit
///
/// Returned synchronously by the service boundary (submit, poll, retrieve).
/// Failures that happen inside a background job never surface here; they are
/// recorded on the job instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.timeout")
        key: Option<String>,
    },

    /// Submitted URL was empty after trimming
    #[error("URL required")]
    EmptyUrl,

    /// URL rejected by the address guard
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// Job registry error (unknown job, job not ready, ...)
    #[error(transparent)]
    Job(#[from] JobError),

    /// Job identifier could not be parsed
    #[error("job not found: {0}")]
    InvalidJobId(String),

    /// Admission gate refused the request
    #[error("too many requests")]
    RateLimited,

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

}

/// Address guard errors (URL validation and blocked destinations)
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    /// URL could not be parsed or is structurally unusable
    #[error("malformed URL: {0}")]
    InvalidUrl(String),

    /// Scheme other than http/https
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// URL has no host component
    #[error("missing hostname")]
    MissingHost,

    /// Host name did not resolve to any address
    #[error("DNS resolution failed for {host}")]
    DnsResolution {
        /// Host that failed to resolve
        host: String,
    },

    /// At least one resolved address is in a blocked range
    #[error("access to host denied: {host} resolves to a blocked address")]
    BlockedDestination {
        /// Host that was rejected
        host: String,
        /// First blocked address found
        address: std::net::IpAddr,
    },
}

impl GuardError {
    /// Whether this is a structural validation failure (scheme, host, syntax)
    /// rather than a resolution or security failure
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GuardError::InvalidUrl(_) | GuardError::UnsupportedScheme(_) | GuardError::MissingHost
        )
    }
}

/// Secure fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL (or redirect target) failed structural validation
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// URL, redirect target or dial target resolved to a blocked address
    #[error("access to host denied: {host} resolves to a blocked address")]
    BlockedDestination {
        /// Host that was rejected
        host: String,
    },

    /// DNS lookup failed or returned nothing
    #[error("DNS resolution failed for {host}")]
    DnsResolution {
        /// Host that failed to resolve
        host: String,
    },

    /// Redirect chain longer than the configured cap
    #[error("too many redirects (max {max})")]
    TooManyRedirects {
        /// Redirect hop limit that was exceeded
        max: usize,
    },

    /// Final response had a non-success status
    #[error("bad status: {status}")]
    ResponseError {
        /// HTTP status code
        status: u16,
    },

    /// Declared or actual body size exceeds the ceiling
    #[error("file exceeds size limit of {limit} bytes")]
    SizeExceeded {
        /// Configured ceiling in bytes
        limit: u64,
    },

    /// The end-to-end deadline elapsed
    #[error("download timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Connection, TLS or protocol failure
    #[error("transfer failed: {0}")]
    Transport(String),

    /// Local file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<GuardError> for FetchError {
    fn from(error: GuardError) -> Self {
        match error {
            GuardError::InvalidUrl(reason) => FetchError::InvalidUrl(reason),
            GuardError::UnsupportedScheme(scheme) => {
                FetchError::InvalidUrl(format!("unsupported scheme: {scheme}"))
            }
            GuardError::MissingHost => FetchError::InvalidUrl("missing hostname".to_string()),
            GuardError::DnsResolution { host } => FetchError::DnsResolution { host },
            GuardError::BlockedDestination { host, .. } => FetchError::BlockedDestination { host },
        }
    }
}

impl FetchError {
    /// Short description safe to show to whoever polls the job
    ///
    /// Local paths and low-level transport detail stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            FetchError::Transport(_) => "connection failed".to_string(),
            FetchError::Io(_) => "failed to store downloaded data".to_string(),
            other => other.to_string(),
        }
    }
}

/// Archive packaging errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// File I/O failure while reading the source or writing an archive
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP writer failure
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The blocking packaging task did not finish
    #[error("archive task failed: {0}")]
    Task(String),
}

/// Job registry errors
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum JobError {
    /// Unknown or already reaped job
    #[error("job {0} not found")]
    NotFound(JobId),

    /// Job exists but its archive is not available
    #[error("job {id} is not ready ({status})")]
    NotReady {
        /// Job that was requested
        id: JobId,
        /// Its status at the time of the request
        status: JobStatus,
    },

    /// State machine refused the mutation
    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Job that was mutated
        id: JobId,
        /// Status before the attempted mutation
        from: JobStatus,
        /// Requested status
        to: JobStatus,
    },
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "job_not_found",
///     "message": "job 1b4e28ba-2fa1-11d2-883f-0016d3cca427 not found"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "job_not_found", "invalid_url")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - structurally invalid input
            Error::EmptyUrl => 400,
            Error::Guard(e) if e.is_validation() => 400,

            // 422 Unprocessable Entity - well-formed URL we refuse to fetch
            Error::Guard(_) => 422,

            // 404 Not Found
            Error::Job(JobError::NotFound(_)) => 404,
            Error::InvalidJobId(_) => 404,

            // 409 Conflict - job exists but is not in the required state
            Error::Job(JobError::NotReady { .. }) => 409,
            Error::Job(JobError::InvalidTransition { .. }) => 409,

            // 429 Too Many Requests
            Error::RateLimited => 429,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,

            // 500 Internal Server Error - Server-side issues
            Error::Config { .. } => 500,
            Error::Io(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::EmptyUrl => "url_required",
            Error::Guard(e) => match e {
                GuardError::InvalidUrl(_) => "invalid_url",
                GuardError::UnsupportedScheme(_) => "unsupported_scheme",
                GuardError::MissingHost => "missing_host",
                GuardError::DnsResolution { .. } => "dns_resolution_failed",
                GuardError::BlockedDestination { .. } => "blocked_destination",
            },
            Error::Job(e) => match e {
                JobError::NotFound(_) => "job_not_found",
                JobError::NotReady { .. } => "job_not_ready",
                JobError::InvalidTransition { .. } => "invalid_transition",
            },
            Error::InvalidJobId(_) => "job_not_found",
            Error::RateLimited => "rate_limited",
            Error::ShuttingDown => "shutting_down",
            Error::Io(_) => "io_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();

        // Server-side failures keep their detail in the logs only
        let message = match &error {
            Error::Io(_) | Error::Config { .. } => {
                "internal server error".to_string()
            }
            _ => error.to_string(),
        };

        let details = match &error {
            Error::Job(JobError::NotFound(id)) => Some(serde_json::json!({
                "job_id": id,
            })),
            Error::Job(JobError::NotReady { id, status }) => Some(serde_json::json!({
                "job_id": id,
                "status": status,
            })),
            Error::Guard(GuardError::BlockedDestination { host, .. }) => Some(serde_json::json!({
                "host": host,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
