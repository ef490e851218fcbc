//! Coarse, user-facing failure categories.
//!
//! The requester only ever sees one of these; the underlying cause is logged
//! and kept in the run report.

use serde::Serialize;

use crate::acquire::{AcquireError, AcquisitionAttempt, AttemptOutcome};
use crate::orchestrator::RelayError;

/// What the requester is told went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// The message held no usable URL.
    InvalidInput,
    /// Connection, DNS or timeout trouble.
    Network,
    /// The platform refused access (HTTP 401/403/429/451 or a failing extractor).
    PlatformBlocked,
    /// A part could not be handed to the transport.
    Delivery,
    /// Anything else.
    Generic,
}

impl FailureCategory {
    /// Emoji prefix for status texts.
    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::InvalidInput => "❌",
            Self::Network => "🌐",
            Self::PlatformBlocked => "🔐",
            Self::Delivery => "📤",
            Self::Generic => "⚠️",
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::InvalidInput => "Invalid input",
            Self::Network => "Network",
            Self::PlatformBlocked => "Platform blocked",
            Self::Delivery => "Delivery",
            Self::Generic => "Other",
        }
    }
}

/// Requester-facing wording for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureDescriptor {
    /// Category described.
    pub category: FailureCategory,
    /// One-line summary, e.g. "Network error".
    pub headline: &'static str,
    /// What the requester can do about it.
    pub hint: &'static str,
}

/// Requester-facing wording for a category.
#[must_use]
pub fn describe(category: FailureCategory) -> FailureDescriptor {
    let (headline, hint) = match category {
        FailureCategory::InvalidInput => (
            "Invalid URL",
            "Please provide a valid HTTP/HTTPS URL.",
        ),
        FailureCategory::Network => ("Network error", "Please check the URL and try again."),
        FailureCategory::PlatformBlocked => (
            "Platform access denied",
            "The platform may block automated downloads.",
        ),
        FailureCategory::Delivery => (
            "Could not send the file",
            "Please try again later.",
        ),
        FailureCategory::Generic => (
            "Could not download the video",
            "Please check the URL and try again.",
        ),
    };
    FailureDescriptor {
        category,
        headline,
        hint,
    }
}

/// Maps a relay failure to the category shown to the requester.
#[must_use]
pub fn categorize(error: &RelayError) -> FailureCategory {
    match error {
        RelayError::InvalidRequest { .. } => FailureCategory::InvalidInput,
        RelayError::Workspace(_) => FailureCategory::Generic,
        RelayError::Acquisition(AcquireError::Exhausted { attempts, .. }) => {
            categorize_attempts(attempts)
        }
        RelayError::Transport { .. } => FailureCategory::Delivery,
    }
}

/// The last strategy that actually failed decides; skips carry no signal.
#[must_use]
pub fn categorize_attempts(attempts: &[AcquisitionAttempt]) -> FailureCategory {
    let last_failure = attempts.iter().rev().find_map(|attempt| match &attempt.outcome {
        AttemptOutcome::Failed(error) => Some(error),
        AttemptOutcome::Success { .. } | AttemptOutcome::Skipped { .. } => None,
    });

    match last_failure {
        Some(error) if error.is_access_denied() => FailureCategory::PlatformBlocked,
        Some(error) if error.is_network() => FailureCategory::Network,
        _ => FailureCategory::Generic,
    }
}
