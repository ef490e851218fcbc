//! Direct byte-stream fetch strategies.
//!
//! Two header profiles share one implementation: the minimal profile (generic
//! User-Agent only) is the always-available last resort; the browser profile
//! mimics a desktop browser to get past naive bot blocking on the big platforms.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use crate::classify::{Platform, filename_for_url};
use crate::user_agent;

use super::{AcquireRequest, Strategy, StrategyError, StrategyOutcome};

/// Write granularity when streaming a body to disk (8 KiB).
pub const STREAM_CHUNK_SIZE: usize = 8 * 1024;

/// Bodies larger than this get progress logging.
const PROGRESS_LOG_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Which request headers a fetch sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderProfile {
    /// Generic User-Agent only.
    Minimal,
    /// Full browser-like header set (accept, language, fetch metadata).
    Browser,
}

impl HeaderProfile {
    fn strategy_name(self) -> &'static str {
        match self {
            Self::Minimal => "direct",
            Self::Browser => "direct-browser",
        }
    }

    fn file_prefix(self) -> &'static str {
        match self {
            Self::Minimal => "",
            Self::Browser => "alternative_",
        }
    }
}

/// Streams the URL straight to a file in the workspace.
#[derive(Debug, Clone)]
pub struct DirectFetchStrategy {
    client: Client,
    profile: HeaderProfile,
    timeout: Duration,
}

impl DirectFetchStrategy {
    /// Creates a fetch strategy with the given header profile.
    ///
    /// `timeout` applies to connecting and to each read, not to the whole body.
    ///
    /// # Errors
    ///
    /// Returns the client builder error when the HTTP client cannot be built.
    pub fn new(profile: HeaderProfile, timeout: Duration) -> Result<Self, reqwest::Error> {
        let builder = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout);
        let builder = match profile {
            HeaderProfile::Minimal => builder
                .gzip(false)
                .user_agent(user_agent::DIRECT_USER_AGENT),
            // Accept-Encoding comes from the client so gzip bodies are decoded.
            HeaderProfile::Browser => builder
                .gzip(true)
                .user_agent(user_agent::BROWSER_USER_AGENT)
                .default_headers(user_agent::browser_headers()),
        };
        Ok(Self {
            client: builder.build()?,
            profile,
            timeout,
        })
    }

    /// Header profile in use.
    #[must_use]
    pub fn profile(&self) -> HeaderProfile {
        self.profile
    }

    /// Downloads `url` into `dest`, returning the number of bytes written.
    ///
    /// The partial file is removed when the transfer fails.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError`] for invalid URLs, connection failures,
    /// timeouts, non-2xx statuses and local IO errors.
    #[instrument(skip(self), fields(profile = ?self.profile, dest = %dest.display()))]
    pub async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64, StrategyError> {
        Url::parse(url).map_err(|_| StrategyError::invalid_url(url))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StrategyError::http_status(url, status.as_u16()));
        }

        let content_length = response.content_length();
        debug!(?content_length, "response accepted, streaming body");

        let file = File::create(dest)
            .await
            .map_err(|e| StrategyError::io(dest, e))?;

        let result = self
            .stream_to_file(file, response, url, dest, content_length)
            .await;
        if result.is_err() {
            debug!(path = %dest.display(), "removing partial file after error");
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }

    async fn stream_to_file(
        &self,
        file: File,
        response: reqwest::Response,
        url: &str,
        dest: &Path,
        content_length: Option<u64>,
    ) -> Result<u64, StrategyError> {
        let mut writer = BufWriter::with_capacity(STREAM_CHUNK_SIZE, file);
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        let mut last_decile = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_request_error(url, e))?;
            for piece in chunk.chunks(STREAM_CHUNK_SIZE) {
                writer
                    .write_all(piece)
                    .await
                    .map_err(|e| StrategyError::io(dest, e))?;
            }
            written += chunk.len() as u64;

            if let Some(total) = content_length.filter(|t| *t > PROGRESS_LOG_THRESHOLD) {
                let decile = written.saturating_mul(10) / total;
                if decile > last_decile {
                    last_decile = decile;
                    info!(percent = decile * 10, bytes = written, "download progress");
                }
            }
        }

        writer
            .flush()
            .await
            .map_err(|e| StrategyError::io(dest, e))?;
        info!(path = %dest.display(), bytes = written, "direct fetch complete");
        Ok(written)
    }

    fn map_request_error(&self, url: &str, error: reqwest::Error) -> StrategyError {
        if error.is_timeout() {
            StrategyError::timeout(self.profile.strategy_name(), self.timeout.as_secs())
        } else {
            StrategyError::network(url, error)
        }
    }
}

#[async_trait]
impl Strategy for DirectFetchStrategy {
    fn name(&self) -> &str {
        self.profile.strategy_name()
    }

    fn applies_to(&self, platform: Platform) -> bool {
        match self.profile {
            HeaderProfile::Minimal => true,
            HeaderProfile::Browser => platform.supports_enhanced_fetch(),
        }
    }

    async fn attempt(&self, request: &AcquireRequest<'_>) -> StrategyOutcome {
        let dir = match request.workspace.strategy_dir(self.name()).await {
            Ok(dir) => dir,
            Err(e) => {
                return StrategyOutcome::Failed(StrategyError::io(
                    request.workspace.downloads_dir(),
                    e,
                ));
            }
        };
        let filename = format!(
            "{}{}",
            self.profile.file_prefix(),
            filename_for_url(request.url)
        );
        let dest = dir.join(filename);

        match self.fetch_to_file(request.url, &dest).await {
            Ok(_) => StrategyOutcome::Success(dest),
            Err(error) => StrategyOutcome::Failed(error),
        }
    }
}
