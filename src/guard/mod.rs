//! Address guard
//!
//! Decides whether a URL may be fetched. The same checks run before a job is
//! created, before each redirect is followed, and again when the HTTP client
//! resolves a host to dial it, so a host whose DNS answer changes between
//! validation and connection is still refused.

pub mod blocklist;
pub mod resolver;

pub use blocklist::{blocked_reason, is_blocked};
pub use resolver::{HostResolver, StaticResolver, SystemResolver};

use crate::config::GuardConfig;
use crate::error::GuardError;
use std::net::IpAddr;
use std::sync::Arc;
use url::{Host, Url};

/// A URL that passed validation, with the addresses it resolved to
#[derive(Clone, Debug)]
pub struct ValidatedUrl {
    /// Parsed URL
    pub url: Url,
    /// Host component as it appeared in the URL
    pub host: String,
    /// Every address the host resolved to at validation time
    pub addresses: Vec<IpAddr>,
}

/// URL and address validation against the blocked ranges
pub struct AddressGuard {
    resolver: Arc<dyn HostResolver>,
    exempt: Vec<IpAddr>,
}

impl std::fmt::Debug for AddressGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressGuard")
            .field("exempt", &self.exempt)
            .finish_non_exhaustive()
    }
}

impl AddressGuard {
    /// Create a guard using `resolver` for host lookups
    pub fn new(config: &GuardConfig, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            resolver,
            exempt: config.exempt_addresses.clone(),
        }
    }

    /// Create a guard backed by the system resolver
    pub fn with_system_resolver(config: &GuardConfig) -> Self {
        Self::new(config, Arc::new(SystemResolver))
    }

    /// Whether `ip` is in a blocked range and not explicitly exempted
    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        !self.exempt.contains(&ip) && is_blocked(ip)
    }

    /// Parse `raw` and check it structurally (scheme and host), without DNS
    pub fn parse_url(raw: &str) -> Result<Url, GuardError> {
        let url = Url::parse(raw).map_err(|e| GuardError::InvalidUrl(e.to_string()))?;
        check_structure(&url)?;
        Ok(url)
    }

    /// Full validation of a raw URL string
    pub async fn validate_url(&self, raw: &str) -> Result<ValidatedUrl, GuardError> {
        let url = Self::parse_url(raw)?;
        self.validate(url).await
    }

    /// Full validation of an already parsed URL (redirect targets)
    pub async fn validate(&self, url: Url) -> Result<ValidatedUrl, GuardError> {
        check_structure(&url)?;

        let (host, addresses) = match url.host() {
            Some(Host::Ipv4(v4)) => {
                let ip = IpAddr::V4(v4);
                self.check_addresses(&v4.to_string(), &[ip])?;
                (v4.to_string(), vec![ip])
            }
            Some(Host::Ipv6(v6)) => {
                let ip = IpAddr::V6(v6);
                self.check_addresses(&v6.to_string(), &[ip])?;
                (v6.to_string(), vec![ip])
            }
            Some(Host::Domain(domain)) => {
                let addresses = self.resolve_host(domain).await?;
                (domain.to_string(), addresses)
            }
            None => return Err(GuardError::MissingHost),
        };

        Ok(ValidatedUrl {
            url,
            host,
            addresses,
        })
    }

    /// Resolve `host` and reject it if any address is blocked
    ///
    /// IP literals are returned as-is after the blocklist check.
    pub async fn resolve_host(&self, host: &str) -> Result<Vec<IpAddr>, GuardError> {
        let literal = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = literal.parse::<IpAddr>() {
            self.check_addresses(host, &[ip])?;
            return Ok(vec![ip]);
        }

        let addresses = self.resolver.resolve(host).await.map_err(|e| {
            tracing::debug!(host, error = %e, "host resolution failed");
            GuardError::DnsResolution {
                host: host.to_string(),
            }
        })?;

        if addresses.is_empty() {
            return Err(GuardError::DnsResolution {
                host: host.to_string(),
            });
        }

        self.check_addresses(host, &addresses)?;
        Ok(addresses)
    }

    fn check_addresses(&self, host: &str, addresses: &[IpAddr]) -> Result<(), GuardError> {
        if let Some(&address) = addresses.iter().find(|ip| self.is_blocked(**ip)) {
            tracing::warn!(
                host,
                address = %address,
                range = blocked_reason(address).unwrap_or("unknown"),
                "blocked destination"
            );
            return Err(GuardError::BlockedDestination {
                host: host.to_string(),
                address,
            });
        }
        Ok(())
    }
}

fn check_structure(url: &Url) -> Result<(), GuardError> {
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(GuardError::UnsupportedScheme(other.to_string())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(GuardError::MissingHost),
    }
}
