//! Immutable relay configuration.
//!
//! A [`RelayConfig`] is built once at startup (defaults, then config file, then
//! command line) and handed to the [`Relay`](crate::Relay). Nothing mutates it
//! afterwards; concurrent runs share it behind an `Arc`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Delivery ceiling of the receiving platform (50 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Size of each part when an oversized file is split (1 MiB).
pub const DEFAULT_SPLIT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Execution budget for one external downloader invocation (5 minutes).
pub const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 300;

/// Connect/read timeout for the minimal-header direct fetch.
pub const DEFAULT_DIRECT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Connect/read timeout for the browser-header direct fetch.
pub const DEFAULT_ENHANCED_FETCH_TIMEOUT_SECS: u64 = 60;

/// Quality cap passed to the platform downloaders.
pub const DEFAULT_MAX_VIDEO_HEIGHT: u32 = 720;

/// Pause between two consecutive part deliveries.
pub const DEFAULT_PART_SEND_DELAY_MS: u64 = 1000;

const MAX_TIMEOUT_SECS: u64 = 3600;

/// Errors raised while validating a configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Split chunk size was zero.
    #[error("split chunk size must be greater than zero")]
    ZeroChunkSize,

    /// A part would be larger than the delivery ceiling.
    #[error("split chunk size {chunk} exceeds the delivery ceiling {max}")]
    ChunkExceedsLimit {
        /// Configured chunk size in bytes.
        chunk: u64,
        /// Configured ceiling in bytes.
        max: u64,
    },

    /// A timeout was outside `1..=3600` seconds.
    #[error("invalid {field}: {secs}s (expected 1..=3600)")]
    InvalidTimeout {
        /// Name of the offending setting.
        field: &'static str,
        /// Rejected value in seconds.
        secs: u64,
    },

    /// Quality cap was zero.
    #[error("maximum video height must be greater than zero")]
    ZeroVideoHeight,
}

/// Executables used by the process strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// Generic platform downloader.
    pub ytdlp: PathBuf,
    /// Legacy platform downloader.
    pub youtube_dl: PathBuf,
    /// Instagram-specific extractor.
    pub instaloader: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ytdlp: PathBuf::from("yt-dlp"),
            youtube_dl: PathBuf::from("youtube-dl"),
            instaloader: PathBuf::from("instaloader"),
        }
    }
}

/// Process-wide relay settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    max_file_size: u64,
    split_chunk_size: u64,
    process_timeout: Duration,
    direct_fetch_timeout: Duration,
    enhanced_fetch_timeout: Duration,
    max_video_height: u32,
    part_send_delay: Duration,
    temp_root: PathBuf,
    tools: ToolPaths,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            split_chunk_size: DEFAULT_SPLIT_CHUNK_SIZE,
            process_timeout: Duration::from_secs(DEFAULT_PROCESS_TIMEOUT_SECS),
            direct_fetch_timeout: Duration::from_secs(DEFAULT_DIRECT_FETCH_TIMEOUT_SECS),
            enhanced_fetch_timeout: Duration::from_secs(DEFAULT_ENHANCED_FETCH_TIMEOUT_SECS),
            max_video_height: DEFAULT_MAX_VIDEO_HEIGHT,
            part_send_delay: Duration::from_millis(DEFAULT_PART_SEND_DELAY_MS),
            temp_root: std::env::temp_dir().join("video-relay"),
            tools: ToolPaths::default(),
        }
    }
}

impl RelayConfig {
    /// Starts a builder seeded with the defaults.
    #[must_use]
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder {
            config: Self::default(),
        }
    }

    /// Largest file delivered without splitting.
    #[must_use]
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Size of every part but the last.
    #[must_use]
    pub fn split_chunk_size(&self) -> u64 {
        self.split_chunk_size
    }

    /// Budget for one external downloader run.
    #[must_use]
    pub fn process_timeout(&self) -> Duration {
        self.process_timeout
    }

    /// Timeout of the minimal-header direct fetch.
    #[must_use]
    pub fn direct_fetch_timeout(&self) -> Duration {
        self.direct_fetch_timeout
    }

    /// Timeout of the browser-header direct fetch.
    #[must_use]
    pub fn enhanced_fetch_timeout(&self) -> Duration {
        self.enhanced_fetch_timeout
    }

    /// Height cap handed to the platform downloaders.
    #[must_use]
    pub fn max_video_height(&self) -> u32 {
        self.max_video_height
    }

    /// Pause between part deliveries.
    #[must_use]
    pub fn part_send_delay(&self) -> Duration {
        self.part_send_delay
    }

    /// Directory under which per-request workspaces are created.
    #[must_use]
    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Downloader executables.
    #[must_use]
    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.split_chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.split_chunk_size > self.max_file_size {
            return Err(ConfigError::ChunkExceedsLimit {
                chunk: self.split_chunk_size,
                max: self.max_file_size,
            });
        }
        validate_timeout("process_timeout", self.process_timeout)?;
        validate_timeout("direct_fetch_timeout", self.direct_fetch_timeout)?;
        validate_timeout("enhanced_fetch_timeout", self.enhanced_fetch_timeout)?;
        if self.max_video_height == 0 {
            return Err(ConfigError::ZeroVideoHeight);
        }
        Ok(())
    }
}

fn validate_timeout(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    let secs = value.as_secs();
    if !(1..=MAX_TIMEOUT_SECS).contains(&secs) {
        return Err(ConfigError::InvalidTimeout { field, secs });
    }
    Ok(())
}

/// Builder for [`RelayConfig`]; `build` validates the result.
#[derive(Debug, Clone)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    #[must_use]
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    #[must_use]
    pub fn split_chunk_size(mut self, bytes: u64) -> Self {
        self.config.split_chunk_size = bytes;
        self
    }

    #[must_use]
    pub fn process_timeout(mut self, timeout: Duration) -> Self {
        self.config.process_timeout = timeout;
        self
    }

    #[must_use]
    pub fn direct_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.direct_fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn enhanced_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.enhanced_fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_video_height(mut self, height: u32) -> Self {
        self.config.max_video_height = height;
        self
    }

    #[must_use]
    pub fn part_send_delay(mut self, delay: Duration) -> Self {
        self.config.part_send_delay = delay;
        self
    }

    #[must_use]
    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.temp_root = root.into();
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolPaths) -> Self {
        self.config.tools = tools;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is out of range.
    pub fn build(self) -> Result<RelayConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
