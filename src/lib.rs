//! Video relay core library
//!
//! Takes a URL from a chat message, acquires the video through a chain of
//! downloaders, splits it under the delivery size ceiling and hands the parts
//! to a transport, cleaning up the per-request workspace on every exit path.
//!
//! # Architecture
//!
//! - [`classify`] - URL to platform tag
//! - [`acquire`] - Strategy chain (yt-dlp, youtube-dl, instaloader, direct fetches)
//! - [`prepare`] - Splitting oversized files into ordered parts
//! - [`workspace`] - Per-request temp directory with guaranteed teardown
//! - [`orchestrator`] - The relay state machine tying it all together
//! - [`transport`] - Delivery seam (status channel plus part sink)

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod acquire;
pub mod classify;
pub mod config;
pub mod failure;
pub mod input;
pub mod messages;
pub mod orchestrator;
pub mod prepare;
pub mod transport;
pub mod user_agent;
pub mod workspace;

// Re-export commonly used types
pub use acquire::{
    AcquireError, AcquiredFile, Acquisition, AcquisitionAttempt, AttemptOutcome, ProcessStrategy,
    Strategy,
    StrategyChain, StrategyError, StrategyOutcome, ToolKind, ToolProbe, build_default_chain,
    probe_tool,
};
pub use classify::{Platform, classify, is_direct_video_url, requires_platform_downloader};
pub use config::{ConfigError, RelayConfig, RelayConfigBuilder, ToolPaths};
pub use failure::FailureCategory;
pub use orchestrator::{FailureReason, Relay, RelayError, RelayState, Request, RunReport};
pub use prepare::{FilePart, SplitError, TransferPreparer};
pub use transport::{DirectoryTransport, OutgoingPart, Transport, TransportError};
pub use workspace::{Workspace, WorkspaceError};
