//! Admission gate consulted before a job is created

use crate::config::AdmissionConfig;
use std::sync::Mutex;
use std::time::Instant;

/// Decides whether a new submission may proceed
pub trait AdmissionGate: Send + Sync {
    /// Consume one unit of admission; `false` means the caller is throttled
    fn allow_request(&self) -> bool;
}

/// Gate that admits everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AdmissionGate for AllowAll {
    fn allow_request(&self) -> bool {
        true
    }
}

/// Simple token bucket
#[derive(Debug)]
struct TokenBucket {
    /// Available tokens
    tokens: f64,
    /// Last refill time
    last_refill: Instant,
    /// Tokens per second
    rate: f64,
    /// Maximum burst size
    capacity: u32,
}

impl TokenBucket {
    fn new(rate: f64, capacity: u32) -> Self {
        Self {
            tokens: capacity as f64,
            last_refill: Instant::now(),
            rate,
            capacity,
        }
    }

    fn try_consume_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity as f64);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// One token bucket shared by every submitter
#[derive(Debug)]
pub struct TokenBucketGate {
    bucket: Mutex<TokenBucket>,
}

impl TokenBucketGate {
    /// Bucket refilling at `requests_per_second` and holding at most `burst_size` tokens
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(requests_per_second as f64, burst_size)),
        }
    }

    /// Build from configuration
    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(config.requests_per_second, config.burst_size)
    }

    fn try_consume_at(&self, now: Instant) -> bool {
        let mut bucket = self
            .bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        bucket.try_consume_at(now)
    }
}

impl AdmissionGate for TokenBucketGate {
    fn allow_request(&self) -> bool {
        let allowed = self.try_consume_at(Instant::now());
        if !allowed {
            tracing::debug!("admission gate refused submission");
        }
        allowed
    }
}

/// Gate for the given configuration: a token bucket, or [`AllowAll`] when disabled
pub fn gate_from_config(config: &AdmissionConfig) -> std::sync::Arc<dyn AdmissionGate> {
    if config.enabled {
        std::sync::Arc::new(TokenBucketGate::from_config(config))
    } else {
        std::sync::Arc::new(AllowAll)
    }
}
