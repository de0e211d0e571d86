//! Host name resolution used by the address guard

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;

/// Resolves a host name to every address it currently maps to
///
/// The guard calls this on every validation and every dial; implementations
/// must not cache answers on its behalf.
#[async_trait]
pub trait HostResolver: Send + Sync + 'static {
    /// Resolve `host` (never an IP literal) to its addresses
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo` via tokio)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Resolver answering from a fixed host table
///
/// Unknown hosts fail with `NotFound`.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `host` to `addresses`
    pub fn with_host(mut self, host: impl Into<String>, addresses: Vec<IpAddr>) -> Self {
        self.hosts.insert(host.into().to_ascii_lowercase(), addresses);
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no such host: {host}"),
                )
            })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_resolver_is_case_insensitive() {
        let resolver =
            StaticResolver::new().with_host("Files.Example", vec!["93.184.216.34".parse().unwrap()]);
        let addrs = resolver.resolve("files.example").await.unwrap();
        assert_eq!(addrs, vec!["93.184.216.34".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn static_resolver_rejects_unknown_hosts() {
        let err = StaticResolver::new().resolve("nowhere").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn system_resolver_resolves_localhost() {
        let addrs = SystemResolver.resolve("localhost").await.unwrap();
        assert!(addrs.iter().any(|ip| ip.is_loopback()));
    }
}
