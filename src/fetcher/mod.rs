//! Secure fetcher
//!
//! Bounded HTTP(S) GET that streams the body to disk while hashing it.
//! Addresses are validated three times: before the first request, on every
//! redirect target, and by [`dial::DialGuard`] whenever the client connects.

mod dial;

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::guard::AddressGuard;
use async_trait::async_trait;
use dial::{DialGuard, RejectionSlot, take_rejection};
use reqwest::{StatusCode, header::LOCATION, redirect::Policy};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Bytes written so far and the declared length, if any
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Body bytes written to disk
    pub bytes_downloaded: u64,
    /// `Content-Length` of the final response
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    /// Whole percentage complete, `None` when the length is unknown or zero
    pub fn percent(&self) -> Option<u8> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                let pct = (self.bytes_downloaded as u128 * 100) / total as u128;
                Some(pct.min(100) as u8)
            }
            _ => None,
        }
    }
}

/// Receives progress after every chunk written
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Called after each write
    async fn report(&self, progress: DownloadProgress);
}

/// Sink that ignores progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _progress: DownloadProgress) {}
}

/// HTTP(S) fetcher bound to an address guard and fetch limits
#[derive(Debug)]
pub struct SecureFetcher {
    guard: Arc<AddressGuard>,
    config: FetchConfig,
}

impl SecureFetcher {
    /// Create a fetcher
    pub fn new(guard: Arc<AddressGuard>, config: FetchConfig) -> Self {
        Self { guard, config }
    }

    /// Fetch limits in use
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Download `url` into `destination` and return the lowercase hex MD5 of the body
    ///
    /// Pre-flight validation, every connection, every redirect and the whole
    /// body share one deadline. On any error the destination file is removed.
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<String, FetchError> {
        let deadline = self.config.timeout;
        let result =
            match tokio::time::timeout(deadline, self.fetch_inner(url, destination, sink)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(deadline)),
            };

        if let Err(e) = &result {
            tracing::debug!(url, error = %e, "fetch failed, removing partial download");
            remove_partial(destination).await;
        }
        result
    }

    async fn fetch_inner(
        &self,
        url: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<String, FetchError> {
        let validated = self.guard.validate_url(url).await?;

        let rejection: RejectionSlot = Arc::default();
        let client = self.build_client(rejection.clone())?;

        let response = self
            .send_following_redirects(&client, validated.url, &rejection)
            .await?;

        self.stream_to_file(response, destination, sink).await
    }

    fn build_client(&self, rejection: RejectionSlot) -> Result<reqwest::Client, FetchError> {
        reqwest::Client::builder()
            .redirect(Policy::none())
            .no_proxy()
            .connect_timeout(self.config.connect_timeout)
            .user_agent(self.config.user_agent.clone())
            .dns_resolver(Arc::new(DialGuard::new(self.guard.clone(), rejection)))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))
    }

    async fn send_following_redirects(
        &self,
        client: &reqwest::Client,
        mut current: Url,
        rejection: &RejectionSlot,
    ) -> Result<reqwest::Response, FetchError> {
        let max = self.config.max_redirects;
        let mut hops = 0usize;

        loop {
            let response = client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| classify_send_error(e, rejection))?;
            let status = response.status();

            if is_followed_redirect(status)
                && let Some(location) = response.headers().get(LOCATION)
            {
                if hops >= max {
                    return Err(FetchError::TooManyRedirects { max });
                }

                let location = location.to_str().map_err(|_| {
                    FetchError::InvalidUrl("redirect location is not valid text".to_string())
                })?;
                let next = current.join(location).map_err(|e| {
                    FetchError::InvalidUrl(format!("bad redirect location: {e}"))
                })?;

                let validated = self.guard.validate(next).await?;
                hops += 1;
                tracing::debug!(from = %current, to = %validated.url, hop = hops, "following redirect");
                current = validated.url;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::ResponseError {
                    status: status.as_u16(),
                });
            }
            return Ok(response);
        }
    }

    async fn stream_to_file(
        &self,
        mut response: reqwest::Response,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<String, FetchError> {
        let limit = self.config.max_file_size;
        let total_bytes = response.content_length();

        if let Some(declared) = total_bytes
            && declared > limit
        {
            return Err(FetchError::SizeExceeded { limit });
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut digest = md5::Context::new();
        let mut written: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
        {
            written += chunk.len() as u64;
            if written > limit {
                return Err(FetchError::SizeExceeded { limit });
            }

            file.write_all(&chunk).await?;
            digest.consume(&chunk);

            sink.report(DownloadProgress {
                bytes_downloaded: written,
                total_bytes,
            })
            .await;
        }

        file.flush().await?;
        file.sync_all().await?;

        Ok(format!("{:x}", digest.compute()))
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn classify_send_error(error: reqwest::Error, rejection: &RejectionSlot) -> FetchError {
    if let Some(refused) = take_rejection(rejection) {
        return refused.into();
    }
    if error.is_timeout() {
        return FetchError::Transport(format!("connection timed out: {error}"));
    }
    FetchError::Transport(error.to_string())
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove partial download");
    }
}
