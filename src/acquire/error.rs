//! Error types for the acquisition chain.

use std::path::PathBuf;

use thiserror::Error;

use crate::classify::Platform;

use super::AcquisitionAttempt;

/// Why a single strategy did not produce a file.
///
/// These never escape the chain on their own; the chain records them and moves
/// on to the next strategy.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The external tool is missing or broken.
    #[error("{tool} unavailable: {reason}")]
    Unavailable {
        /// Tool name.
        tool: String,
        /// What went wrong when launching it.
        reason: String,
    },

    /// The strategy ran past its execution budget.
    #[error("{strategy} timed out after {secs}s")]
    Timeout {
        /// Strategy name.
        strategy: String,
        /// Budget in seconds.
        secs: u64,
    },

    /// The external tool exited with a failure status.
    #[error("{tool} exited with {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")))]
    ProcessExit {
        /// Tool name.
        tool: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
        /// Tail of the tool's stderr.
        stderr: String,
    },

    /// Connection-level failure (DNS, refused, TLS, reset).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// Status code.
        status: u16,
    },

    /// Local filesystem failure.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The tool reported success but left no recognizable video file.
    #[error("no video file produced in {dir}")]
    NoOutput {
        /// Scanned directory.
        dir: PathBuf,
    },

    /// More than one candidate video file was produced.
    #[error("ambiguous output in {dir}: {} candidate files", candidates.len())]
    AmbiguousOutput {
        /// Scanned directory.
        dir: PathBuf,
        /// Every matching file, sorted.
        candidates: Vec<PathBuf>,
    },

    /// The produced file is empty.
    #[error("produced file {path} is empty")]
    EmptyOutput {
        /// The empty file.
        path: PathBuf,
    },

    /// The URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected input.
        url: String,
    },
}

impl StrategyError {
    pub fn unavailable(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(strategy: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            strategy: strategy.into(),
            secs,
        }
    }

    pub fn process_exit(tool: impl Into<String>, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::ProcessExit {
            tool: tool.into(),
            code,
            stderr: stderr.into(),
        }
    }

    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// True when the remote side refused us (auth walls, bot blocking, rate
    /// limits) or a platform tool could not extract the video.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => matches!(status, 401 | 403 | 429 | 451),
            Self::ProcessExit { .. } => true,
            _ => false,
        }
    }

    /// True for connectivity problems and timeouts.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

/// Failure of the whole acquisition chain.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Every applicable strategy ran and none produced a usable file.
    #[error("all {} acquisition strategies failed for {platform} URL {url}", attempts.len())]
    Exhausted {
        /// Requested URL.
        url: String,
        /// Detected platform.
        platform: Platform,
        /// One record per strategy that ran, in order.
        attempts: Vec<AcquisitionAttempt>,
    },
}

impl AcquireError {
    /// Attempts recorded before the chain gave up.
    #[must_use]
    pub fn attempts(&self) -> &[AcquisitionAttempt] {
        match self {
            Self::Exhausted { attempts, .. } => attempts,
        }
    }
}
