//! Configuration types for zipjit

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

/// Secure fetcher limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum accepted body size in bytes (default: 2000 MiB)
    ///
    /// Applies both to the declared `Content-Length` and to the bytes actually read.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum number of redirect hops to follow (default: 3)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// End-to-end deadline covering connects, redirects and the body (default: 5 minutes)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Deadline for establishing a single TCP connection (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_redirects: default_max_redirects(),
            timeout: default_fetch_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Address guard configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Addresses that are never treated as blocked (default: none)
    ///
    /// Exact-address matches only; there is no way to exempt a whole range.
    #[serde(default)]
    pub exempt_addresses: Vec<IpAddr>,
}

/// Job registry, temp storage and reaper configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobConfig {
    /// Directory for downloads and archives (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Age after which a job and its archive are deleted (default: 30 minutes)
    #[serde(default = "default_max_age", with = "duration_serde")]
    pub max_age: Duration,

    /// How often the reaper runs (default: 10 minutes)
    #[serde(default = "default_reap_interval", with = "duration_serde")]
    pub reap_interval: Duration,

    /// Age after which unreferenced files in `temp_dir` are deleted (default: 1 hour)
    #[serde(default = "default_orphan_max_age", with = "duration_serde")]
    pub orphan_max_age: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            max_age: default_max_age(),
            reap_interval: default_reap_interval(),
            orphan_max_age: default_orphan_max_age(),
        }
    }
}

/// Global admission gate (token bucket consulted before a job is created)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Enable the gate (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sustained submissions per second (default: 1)
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Burst size (default: 2)
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

/// API and external server integration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerIntegrationConfig {
    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:9443)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: false)
    #[serde(default)]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Time a client gets to send the complete request head (default: 15 seconds)
    ///
    /// Connections still sending headers after this are closed.
    #[serde(default = "default_header_read_timeout", with = "duration_serde")]
    pub header_read_timeout: Duration,

    /// Deadline for producing a response once the head is read (default: 30 seconds)
    ///
    /// Covers reading the request body; exceeded requests get `408`.
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: false,
            cors_origins: default_cors_origins(),
            header_read_timeout: default_header_read_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Main configuration for ZipService
///
/// Every section has defaults, so `{}` is a valid configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Fetch limits
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Address guard settings
    #[serde(default)]
    pub guard: GuardConfig,

    /// Job lifetime and storage
    #[serde(default)]
    pub jobs: JobConfig,

    /// Submission rate limiting
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// API server settings
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Temporary directory
    pub fn temp_dir(&self) -> &PathBuf {
        &self.jobs.temp_dir
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse '{}': {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> Error {
            Error::Config {
                message: message.to_string(),
                key: Some(key.to_string()),
            }
        }

        if self.fetch.max_file_size == 0 {
            return Err(invalid("fetch.max_file_size", "must be greater than zero"));
        }
        if self.fetch.timeout.is_zero() {
            return Err(invalid("fetch.timeout", "must be greater than zero"));
        }
        if self.fetch.connect_timeout.is_zero() {
            return Err(invalid("fetch.connect_timeout", "must be greater than zero"));
        }
        if self.jobs.reap_interval.is_zero() {
            return Err(invalid("jobs.reap_interval", "must be greater than zero"));
        }
        if self.server.api.header_read_timeout.is_zero() {
            return Err(invalid(
                "server.api.header_read_timeout",
                "must be greater than zero",
            ));
        }
        if self.server.api.request_timeout.is_zero() {
            return Err(invalid("server.api.request_timeout", "must be greater than zero"));
        }
        if self.admission.enabled && self.admission.requests_per_second == 0 {
            return Err(invalid(
                "admission.requests_per_second",
                "must be greater than zero when admission is enabled",
            ));
        }
        if self.admission.enabled && self.admission.burst_size == 0 {
            return Err(invalid(
                "admission.burst_size",
                "must be greater than zero when admission is enabled",
            ));
        }
        Ok(())
    }
}

fn default_max_file_size() -> u64 {
    2000 * 1024 * 1024
}

fn default_max_redirects() -> usize {
    3
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("zipjit/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_max_age() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_reap_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_orphan_max_age() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_true() -> bool {
    true
}

fn default_requests_per_second() -> u32 {
    1
}

fn default_burst_size() -> u32 {
    2
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9443))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_header_read_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
