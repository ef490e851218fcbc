//! Acquisition chain: turning a URL into a local video file.
//!
//! # Architecture
//!
//! - [`Strategy`] - Async trait implemented by every acquisition method
//! - [`StrategyChain`] - Ordered strategies folded left to right until one succeeds
//! - [`StrategyOutcome`] - Tagged result of a single attempt
//! - [`ProcessStrategy`] - External downloader (yt-dlp, youtube-dl, instaloader)
//! - [`DirectFetchStrategy`] - Streaming HTTP GET with a minimal or browser header set
//!
//! Strategies run strictly one after another. The first one that leaves a
//! non-empty file wins and nothing after it runs; failures are recorded as
//! [`AcquisitionAttempt`]s and only surface when the whole chain is exhausted.

mod error;
mod http;
mod output;
mod process;

pub use error::{AcquireError, StrategyError};
pub use http::{DirectFetchStrategy, HeaderProfile, STREAM_CHUNK_SIZE};
pub use output::{OutputNaming, resolve_output};
pub use process::{ProcessStrategy, ToolKind, ToolProbe, probe_tool};

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::classify::Platform;
use crate::config::RelayConfig;
use crate::workspace::Workspace;

/// Builds the chain in its fixed priority order:
/// yt-dlp, youtube-dl, instaloader, browser-header fetch, minimal fetch.
#[must_use]
pub fn build_default_chain(config: &RelayConfig) -> StrategyChain {
    let mut chain = StrategyChain::new();
    let tools = config.tools();

    chain.register(Box::new(ProcessStrategy::new(
        ToolKind::YtDlp,
        tools.ytdlp.clone(),
        config.process_timeout(),
        config.max_video_height(),
    )));
    chain.register(Box::new(ProcessStrategy::new(
        ToolKind::YoutubeDl,
        tools.youtube_dl.clone(),
        config.process_timeout(),
        config.max_video_height(),
    )));
    chain.register(Box::new(ProcessStrategy::new(
        ToolKind::Instaloader,
        tools.instaloader.clone(),
        config.process_timeout(),
        config.max_video_height(),
    )));

    for (profile, timeout) in [
        (HeaderProfile::Browser, config.enhanced_fetch_timeout()),
        (HeaderProfile::Minimal, config.direct_fetch_timeout()),
    ] {
        match DirectFetchStrategy::new(profile, timeout) {
            Ok(strategy) => chain.register(Box::new(strategy)),
            Err(error) => warn!(
                profile = ?profile,
                error = %error,
                "direct fetch strategy unavailable; continuing without it"
            ),
        }
    }

    chain
}

/// Inputs shared by every strategy of one run.
#[derive(Debug, Clone, Copy)]
pub struct AcquireRequest<'a> {
    /// URL to acquire.
    pub url: &'a str,
    /// Platform the URL was classified as.
    pub platform: Platform,
    /// Session workspace receiving the output.
    pub workspace: &'a Workspace,
}

/// Result of one strategy attempt.
#[derive(Debug)]
pub enum StrategyOutcome {
    /// A file was produced at this path.
    Success(PathBuf),
    /// The strategy could not run at all (tool missing or broken).
    Skipped(String),
    /// The strategy ran and failed.
    Failed(StrategyError),
}

/// One acquisition method.
///
/// Uses `async_trait` so strategies can live in the chain as `Box<dyn Strategy>`.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable name used in logs and attempt records.
    fn name(&self) -> &str;

    /// Whether the strategy is worth running for this platform.
    fn applies_to(&self, platform: Platform) -> bool;

    /// Runs the strategy. Implementations write only under the workspace.
    async fn attempt(&self, request: &AcquireRequest<'_>) -> StrategyOutcome;
}

/// What happened to one attempt, as recorded by the chain.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The attempt produced the acquired file.
    Success {
        /// Produced file.
        path: PathBuf,
    },
    /// The strategy was unavailable.
    Skipped {
        /// Why it could not run.
        reason: String,
    },
    /// The strategy failed.
    Failed(StrategyError),
}

impl AttemptOutcome {
    /// Short label for reports.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Skipped { .. } => "skipped",
            Self::Failed(_) => "failed",
        }
    }

    /// Human-readable detail (path, skip reason, or error).
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Success { path } => path.display().to_string(),
            Self::Skipped { reason } => reason.clone(),
            Self::Failed(error) => error.to_string(),
        }
    }
}

/// Record of one strategy run.
#[derive(Debug)]
pub struct AcquisitionAttempt {
    /// Strategy name.
    pub strategy: String,
    /// Wall-clock start.
    pub started_at: SystemTime,
    /// How long the attempt took.
    pub elapsed: Duration,
    /// Result.
    pub outcome: AttemptOutcome,
}

/// A file acquired into the session workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredFile {
    /// Absolute path inside the workspace.
    pub path: PathBuf,
    /// Size in bytes (never zero).
    pub size: u64,
    /// Lowercase extension without the dot, empty when absent.
    pub extension: String,
}

impl AcquiredFile {
    /// Stats `path` and builds the record.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::Io`] when the file cannot be inspected and
    /// [`StrategyError::EmptyOutput`] when it is not a non-empty regular file.
    pub async fn inspect(path: &Path) -> Result<Self, StrategyError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| StrategyError::io(path, e))?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(StrategyError::EmptyOutput {
                path: path.to_path_buf(),
            });
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
            extension,
        })
    }

    /// Final path component, for captions.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Successful acquisition with the attempts that led to it.
#[derive(Debug)]
pub struct Acquisition {
    /// The acquired file.
    pub file: AcquiredFile,
    /// Every attempt in order; the last one is the success.
    pub attempts: Vec<AcquisitionAttempt>,
}

/// Ordered collection of strategies.
///
/// Order is registration order; applicability is decided per platform.
pub struct StrategyChain {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Appends a strategy at the lowest priority.
    pub fn register(&mut self, strategy: Box<dyn Strategy>) {
        debug!(name = strategy.name(), "registering strategy");
        self.strategies.push(strategy);
    }

    /// Number of registered strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Names of the strategies that would run for `platform`, in order.
    #[must_use]
    pub fn plan(&self, platform: Platform) -> Vec<&str> {
        self.strategies
            .iter()
            .filter(|s| s.applies_to(platform))
            .map(|s| s.name())
            .collect()
    }

    /// Runs applicable strategies in order until one yields a non-empty file.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Exhausted`] with every attempt when no strategy
    /// produced a usable file.
    #[tracing::instrument(skip(self, workspace), fields(platform = %platform))]
    pub async fn acquire(
        &self,
        url: &str,
        platform: Platform,
        workspace: &Workspace,
    ) -> Result<Acquisition, AcquireError> {
        let request = AcquireRequest {
            url,
            platform,
            workspace,
        };
        let mut attempts = Vec::new();

        for strategy in self.strategies.iter().filter(|s| s.applies_to(platform)) {
            let name = strategy.name().to_string();
            let started_at = SystemTime::now();
            let clock = Instant::now();
            info!(strategy = %name, url = %url, "trying strategy");

            let outcome = match strategy.attempt(&request).await {
                StrategyOutcome::Success(path) => match AcquiredFile::inspect(&path).await {
                    Ok(file) => {
                        info!(
                            strategy = %name,
                            path = %file.path.display(),
                            bytes = file.size,
                            "strategy produced file"
                        );
                        attempts.push(AcquisitionAttempt {
                            strategy: name,
                            started_at,
                            elapsed: clock.elapsed(),
                            outcome: AttemptOutcome::Success { path },
                        });
                        return Ok(Acquisition { file, attempts });
                    }
                    Err(error) => {
                        warn!(strategy = %name, error = %error, "strategy output unusable");
                        AttemptOutcome::Failed(error)
                    }
                },
                StrategyOutcome::Skipped(reason) => {
                    info!(strategy = %name, reason = %reason, "strategy skipped");
                    AttemptOutcome::Skipped { reason }
                }
                StrategyOutcome::Failed(error) => {
                    warn!(strategy = %name, error = %error, "strategy failed, trying next");
                    AttemptOutcome::Failed(error)
                }
            };

            attempts.push(AcquisitionAttempt {
                strategy: name,
                started_at,
                elapsed: clock.elapsed(),
                outcome,
            });
        }

        warn!(url = %url, attempts = attempts.len(), "acquisition exhausted");
        Err(AcquireError::Exhausted {
            url: url.to_string(),
            platform,
            attempts,
        })
    }
}

impl std::fmt::Debug for StrategyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("StrategyChain")
            .field("strategies", &names)
            .finish()
    }
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::new()
    }
}
