//! The relay run: classify, acquire, prepare, deliver, clean up.
//!
//! # State machine
//!
//! ```text
//! Received -> Classifying -> Acquiring -> Preparing -> Delivering -> Completed
//!     \            \              \            \             \
//!      +------------+--------------+------------+-------------+--> Failed(reason)
//! ```
//!
//! Every run owns one [`Workspace`]. It is destroyed after the run reaches a
//! terminal state, whichever path led there; if the run future is dropped
//! midway the workspace's `Drop` removes the tree instead.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::acquire::{
    AcquireError, AcquiredFile, AcquisitionAttempt, StrategyChain, build_default_chain,
};
use crate::classify::{Platform, classify, filename_for_url};
use crate::config::RelayConfig;
use crate::failure::{FailureCategory, categorize, describe};
use crate::input::extract_url;
use crate::messages;
use crate::prepare::{FilePart, TransferPreparer};
use crate::transport::{OutgoingPart, Transport, TransportError};
use crate::workspace::{Workspace, WorkspaceError};

/// One relay request. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The http(s) URL to relay.
    pub url: String,
    /// Opaque identity of the requester, shown in captions.
    pub requested_by: String,
    /// When the request entered the relay.
    pub received_at: SystemTime,
}

impl Request {
    /// Request for `url`, stamped with the current time.
    #[must_use]
    pub fn new(url: impl Into<String>, requested_by: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            requested_by: requested_by.into(),
            received_at: SystemTime::now(),
        }
    }

    /// Builds a request from free-form message text.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] when the text holds no http(s) URL.
    pub fn from_message(text: &str, requested_by: impl Into<String>) -> Result<Self, RelayError> {
        let url = extract_url(text).ok_or_else(|| RelayError::InvalidRequest {
            text: text.trim().to_string(),
        })?;
        Ok(Self::new(url, requested_by))
    }
}

/// Why a run ended in [`RelayState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The message carried no usable URL.
    InvalidRequest,
    /// The session directory could not be created.
    WorkspaceUnavailable,
    /// Every applicable strategy ran and none produced a file.
    AcquisitionExhausted,
    /// The transport refused a part; later parts were not sent.
    TransportError,
}

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayState {
    /// Request accepted, nothing done yet.
    Received,
    /// Deciding which platform the URL belongs to.
    Classifying,
    /// Walking the strategy chain.
    Acquiring,
    /// Checking the size and splitting if needed.
    Preparing,
    /// Handing parts to the transport in order.
    Delivering,
    /// Every part was delivered.
    Completed,
    /// The run stopped early.
    Failed(FailureReason),
}

impl RelayState {
    /// `Completed` and `Failed` have no successors.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }

    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (from, Self::Failed(_)) => !from.is_terminal(),
            (Self::Received, Self::Classifying)
            | (Self::Classifying, Self::Acquiring)
            | (Self::Acquiring, Self::Preparing)
            | (Self::Preparing, Self::Delivering)
            | (Self::Delivering, Self::Completed) => true,
            _ => false,
        }
    }
}

/// Errors that end a relay run.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No http(s) URL in the incoming text.
    #[error("no http(s) URL found in request {text:?}")]
    InvalidRequest {
        /// The trimmed message text.
        text: String,
    },

    /// The session workspace could not be opened.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// The strategy chain was exhausted.
    #[error(transparent)]
    Acquisition(#[from] AcquireError),

    /// A part was not delivered.
    #[error("delivery stopped at part {part}/{total}: {source}")]
    Transport {
        /// 1-based index of the refused part.
        part: usize,
        /// Number of parts in the delivery.
        total: usize,
        /// What the transport reported.
        #[source]
        source: TransportError,
    },
}

impl RelayError {
    /// Terminal state reason for this error.
    #[must_use]
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::InvalidRequest { .. } => FailureReason::InvalidRequest,
            Self::Workspace(_) => FailureReason::WorkspaceUnavailable,
            Self::Acquisition(_) => FailureReason::AcquisitionExhausted,
            Self::Transport { .. } => FailureReason::TransportError,
        }
    }
}

/// Flattened [`AcquisitionAttempt`] for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptSummary {
    /// Strategy name.
    pub strategy: String,
    /// `success`, `skipped` or `failed`.
    pub outcome: &'static str,
    /// Produced path or failure cause.
    pub detail: String,
    /// Wall time spent in the strategy.
    pub elapsed_ms: u64,
}

impl From<&AcquisitionAttempt> for AttemptSummary {
    fn from(attempt: &AcquisitionAttempt) -> Self {
        Self {
            strategy: attempt.strategy.clone(),
            outcome: attempt.outcome.label(),
            detail: attempt.outcome.detail(),
            elapsed_ms: millis(attempt.elapsed),
        }
    }
}

/// Everything known about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// URL the run was for (the raw text for invalid requests).
    pub url: String,
    /// Requester identity.
    pub requested_by: String,
    /// Set once classification ran.
    pub platform: Option<Platform>,
    /// Final state.
    pub state: RelayState,
    /// Every state entered, starting with `received`.
    pub transitions: Vec<RelayState>,
    /// One entry per strategy that ran.
    pub attempts: Vec<AttemptSummary>,
    /// Name of the acquired file.
    pub file_name: Option<String>,
    /// Size of the acquired file.
    pub bytes: Option<u64>,
    pub parts_total: usize,
    pub parts_sent: usize,
    /// Requester-facing category when the run failed.
    pub failure: Option<FailureCategory>,
    /// Full error chain when the run failed.
    pub error: Option<String>,
    /// Session directory, already removed when the report is returned.
    pub workspace: Option<PathBuf>,
    pub elapsed_ms: u64,
}

impl RunReport {
    fn new(url: &str, requested_by: &str) -> Self {
        Self {
            url: url.to_string(),
            requested_by: requested_by.to_string(),
            platform: None,
            state: RelayState::Received,
            transitions: vec![RelayState::Received],
            attempts: Vec::new(),
            file_name: None,
            bytes: None,
            parts_total: 0,
            parts_sent: 0,
            failure: None,
            error: None,
            workspace: None,
            elapsed_ms: 0,
        }
    }

    fn advance(&mut self, next: RelayState) {
        if !self.state.can_transition_to(next) {
            // Unreachable from `Relay::run`; recorded rather than panicking.
            warn!(from = ?self.state, to = ?next, "illegal state transition");
        }
        debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
        self.transitions.push(next);
    }

    /// True when the run reached `Completed`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == RelayState::Completed
    }
}

/// Drives relay runs. Cheap to share; runs hold no state on `self`.
#[derive(Debug)]
pub struct Relay {
    config: Arc<RelayConfig>,
    chain: StrategyChain,
    preparer: TransferPreparer,
}

impl Relay {
    /// Relay with the standard strategy chain.
    #[must_use]
    pub fn new(config: Arc<RelayConfig>) -> Self {
        let chain = build_default_chain(&config);
        Self::with_chain(config, chain)
    }

    /// Relay with a caller-supplied chain.
    #[must_use]
    pub fn with_chain(config: Arc<RelayConfig>, chain: StrategyChain) -> Self {
        let preparer = TransferPreparer::from_config(&config);
        Self {
            config,
            chain,
            preparer,
        }
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Strategies this relay runs.
    #[must_use]
    pub fn chain(&self) -> &StrategyChain {
        &self.chain
    }

    /// Parses message text and runs the relay for the URL it contains.
    pub async fn handle_message(
        &self,
        text: &str,
        requested_by: &str,
        transport: &dyn Transport,
    ) -> RunReport {
        match Request::from_message(text, requested_by) {
            Ok(request) => self.run(&request, transport).await,
            Err(error) => {
                warn!(error = %error, "rejecting request");
                let mut report = RunReport::new(text.trim(), requested_by);
                transport.update_status(&messages::invalid_request()).await;
                finish_failed(&mut report, &error);
                report
            }
        }
    }

    /// Runs one request to a terminal state. Never fails; the outcome is in
    /// the report.
    #[instrument(skip(self, request, transport), fields(url = %request.url, requested_by = %request.requested_by))]
    pub async fn run(&self, request: &Request, transport: &dyn Transport) -> RunReport {
        let clock = Instant::now();
        let mut report = RunReport::new(&request.url, &request.requested_by);
        transport.update_status(&messages::analyzing()).await;

        let mut workspace = match Workspace::open(self.config.temp_root()).await {
            Ok(workspace) => workspace,
            Err(error) => {
                let error = RelayError::from(error);
                notify_failure(transport, &error).await;
                finish_failed(&mut report, &error);
                report.elapsed_ms = millis(clock.elapsed());
                return report;
            }
        };
        report.workspace = Some(workspace.path().to_path_buf());

        let outcome = self
            .execute(request, &workspace, transport, &mut report)
            .await;
        match outcome {
            Ok(()) => {
                report.advance(RelayState::Completed);
                info!(parts = report.parts_sent, "relay completed");
            }
            Err(error) => {
                notify_failure(transport, &error).await;
                finish_failed(&mut report, &error);
            }
        }

        workspace.destroy().await;
        report.elapsed_ms = millis(clock.elapsed());
        report
    }

    async fn execute(
        &self,
        request: &Request,
        workspace: &Workspace,
        transport: &dyn Transport,
        report: &mut RunReport,
    ) -> Result<(), RelayError> {
        report.advance(RelayState::Classifying);
        let platform = classify(&request.url);
        report.platform = Some(platform);
        info!(platform = %platform, plan = ?self.chain.plan(platform), "classified request");
        transport
            .update_status(&messages::downloading(&filename_for_url(&request.url), platform))
            .await;

        report.advance(RelayState::Acquiring);
        let acquisition = match self.chain.acquire(&request.url, platform, workspace).await {
            Ok(acquisition) => acquisition,
            Err(error) => {
                report.attempts = error.attempts().iter().map(AttemptSummary::from).collect();
                return Err(error.into());
            }
        };
        report.attempts = acquisition.attempts.iter().map(AttemptSummary::from).collect();
        let file = acquisition.file;
        report.file_name = Some(file.file_name());
        report.bytes = Some(file.size);

        report.advance(RelayState::Preparing);
        if self.preparer.needs_split(file.size) {
            transport
                .update_status(&messages::splitting(
                    file.size,
                    self.preparer.part_count(file.size),
                ))
                .await;
        }
        let parts = self.preparer.prepare(&file).await;
        report.parts_total = parts.len();

        report.advance(RelayState::Delivering);
        self.deliver(request, &file, &parts, transport, report).await
    }

    async fn deliver(
        &self,
        request: &Request,
        file: &AcquiredFile,
        parts: &[FilePart],
        transport: &dyn Transport,
        report: &mut RunReport,
    ) -> Result<(), RelayError> {
        let total = parts.len();
        let split = total > 1;
        let file_name = file.file_name();

        for (position, part) in parts.iter().enumerate() {
            if position > 0 && !self.config.part_send_delay().is_zero() {
                tokio::time::sleep(self.config.part_send_delay()).await;
            }

            let outgoing = if split {
                transport
                    .update_status(&messages::sending_part(part.index, total, part.size))
                    .await;
                OutgoingPart {
                    index: part.index,
                    total,
                    path: part.path.clone(),
                    size: part.size,
                    file_name: part
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    caption: messages::part_caption(
                        &file_name,
                        part.index,
                        total,
                        part.size,
                        &request.requested_by,
                        &request.url,
                    ),
                }
            } else {
                transport
                    .update_status(&messages::sending_file(&file_name, part.size))
                    .await;
                OutgoingPart {
                    index: part.index,
                    total,
                    path: part.path.clone(),
                    size: part.size,
                    file_name: file_name.clone(),
                    caption: messages::single_caption(
                        &file_name,
                        part.size,
                        &request.requested_by,
                        &request.url,
                    ),
                }
            };

            transport
                .send_part(&outgoing)
                .await
                .map_err(|source| RelayError::Transport {
                    part: part.index,
                    total,
                    source,
                })?;
            report.parts_sent += 1;
            debug!(part = part.index, total, "part handed to transport");

            if split {
                if let Err(e) = tokio::fs::remove_file(&part.path).await {
                    debug!(path = %part.path.display(), error = %e, "could not remove sent part");
                }
            }
        }

        transport.update_status(&messages::completed(&file_name)).await;
        Ok(())
    }
}

async fn notify_failure(transport: &dyn Transport, error: &RelayError) {
    let descriptor = describe(categorize(error));
    transport
        .update_status(&messages::failed(descriptor.headline, descriptor.hint))
        .await;
}

fn finish_failed(report: &mut RunReport, error: &RelayError) {
    let category = categorize(error);
    error!(
        error = %error,
        category = category.label(),
        "relay failed"
    );
    report.failure = Some(category);
    report.error = Some(error.to_string());
    report.advance(RelayState::Failed(error.reason()));
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
