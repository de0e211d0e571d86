//! Dial-time address validation
//!
//! `DialGuard` is installed as the HTTP client's DNS resolver, which makes it
//! the only source of socket addresses the connector will ever dial for a
//! named host. Every connection attempt re-resolves through the guard and
//! refuses to hand over a blocked address.

use crate::error::GuardError;
use crate::guard::AddressGuard;
use hyper::client::connect::dns::Name;
use reqwest::dns::{Addrs, Resolve, Resolving};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// Slot recording why the last dial was refused
///
/// reqwest wraps resolver errors in an opaque connect error; the fetcher reads
/// this slot to report the rejection as a blocked destination.
pub(crate) type RejectionSlot = Arc<Mutex<Option<GuardError>>>;

pub(crate) struct DialGuard {
    guard: Arc<AddressGuard>,
    rejection: RejectionSlot,
}

impl DialGuard {
    pub(crate) fn new(guard: Arc<AddressGuard>, rejection: RejectionSlot) -> Self {
        Self { guard, rejection }
    }
}

impl Resolve for DialGuard {
    fn resolve(&self, name: Name) -> Resolving {
        let guard = self.guard.clone();
        let rejection = self.rejection.clone();
        let host = name.as_str().to_string();

        Box::pin(async move {
            match guard.resolve_host(&host).await {
                Ok(addresses) => {
                    tracing::debug!(host = %host, addresses = ?addresses, "dial validated");
                    // The connector overrides the port with the URL's
                    let addrs: Addrs =
                        Box::new(addresses.into_iter().map(|ip| SocketAddr::new(ip, 0)));
                    Ok(addrs)
                }
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "dial refused");
                    record_rejection(&rejection, e.clone());
                    Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
                }
            }
        })
    }
}

fn record_rejection(slot: &RejectionSlot, error: GuardError) {
    let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = Some(error);
}

/// Take the recorded rejection, if any
pub(crate) fn take_rejection(slot: &RejectionSlot) -> Option<GuardError> {
    slot.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;
    use crate::guard::StaticResolver;
    use std::net::IpAddr;

    fn dial_guard(resolver: StaticResolver) -> (DialGuard, RejectionSlot) {
        let guard = Arc::new(AddressGuard::new(&GuardConfig::default(), Arc::new(resolver)));
        let slot: RejectionSlot = Arc::default();
        (DialGuard::new(guard, slot.clone()), slot)
    }

    #[tokio::test]
    async fn passes_public_addresses_through() {
        let public: IpAddr = "93.184.216.34".parse().unwrap();
        let (dial, slot) = dial_guard(StaticResolver::new().with_host("files.example", vec![public]));

        let addrs: Vec<SocketAddr> = dial
            .resolve("files.example".parse().unwrap())
            .await
            .unwrap()
            .collect();

        assert_eq!(addrs, vec![SocketAddr::new(public, 0)]);
        assert!(take_rejection(&slot).is_none());
    }

    #[tokio::test]
    async fn refuses_blocked_addresses_and_records_why() {
        let (dial, slot) = dial_guard(
            StaticResolver::new().with_host("internal.example", vec!["10.0.0.7".parse().unwrap()]),
        );

        let result = dial.resolve("internal.example".parse().unwrap()).await;
        assert!(result.is_err());

        let rejection = take_rejection(&slot).unwrap();
        assert!(matches!(rejection, GuardError::BlockedDestination { .. }));
        assert!(take_rejection(&slot).is_none());
    }
}
