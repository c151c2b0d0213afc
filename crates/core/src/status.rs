//! Work-item status values reported by the remote engine.
//!
//! The engine reports a fine-grained status string. Every value collapses
//! onto one of five [`StatusPhase`]s: `Pending` and `InProgress` are
//! non-terminal, `Success`, `Failed` and `Cancelled` are terminal.

use serde::{Deserialize, Serialize};

/// Status of a work item exactly as the engine names it.
///
/// Unknown strings fail to deserialize; callers treat that as a malformed
/// status payload rather than guessing a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkItemStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "inprogress")]
    InProgress,
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "failedLimitDataSize")]
    FailedLimitDataSize,
    #[serde(rename = "failedLimitProcessingTime")]
    FailedLimitProcessingTime,
    #[serde(rename = "failedDownload")]
    FailedDownload,
    #[serde(rename = "failedInstructions")]
    FailedInstructions,
    #[serde(rename = "failedUpload")]
    FailedUpload,
    #[serde(rename = "failedUploadOptional")]
    FailedUploadOptional,
}

/// Coarse lifecycle phase of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatusPhase {
    Pending,
    InProgress,
    Success,
    Failed,
    Cancelled,
}

impl WorkItemStatus {
    /// Collapse the engine status onto its lifecycle phase.
    pub fn phase(self) -> StatusPhase {
        match self {
            Self::Pending => StatusPhase::Pending,
            Self::InProgress => StatusPhase::InProgress,
            Self::Success => StatusPhase::Success,
            Self::Cancelled => StatusPhase::Cancelled,
            Self::FailedLimitDataSize
            | Self::FailedLimitProcessingTime
            | Self::FailedDownload
            | Self::FailedInstructions
            | Self::FailedUpload
            | Self::FailedUploadOptional => StatusPhase::Failed,
        }
    }

    /// Whether no further transition can follow this status.
    pub fn is_terminal(self) -> bool {
        self.phase().is_terminal()
    }

    /// The engine's wire name for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "inprogress",
            Self::Success => "success",
            Self::Cancelled => "cancelled",
            Self::FailedLimitDataSize => "failedLimitDataSize",
            Self::FailedLimitProcessingTime => "failedLimitProcessingTime",
            Self::FailedDownload => "failedDownload",
            Self::FailedInstructions => "failedInstructions",
            Self::FailedUpload => "failedUpload",
            Self::FailedUploadOptional => "failedUploadOptional",
        }
    }
}

impl std::fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StatusPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal observation.
    ///
    /// Terminal phases accept nothing. A non-terminal phase may repeat,
    /// move forward, or jump straight to a terminal phase; it never moves
    /// back from `InProgress` to `Pending`.
    pub fn can_transition_to(self, next: StatusPhase) -> bool {
        match self {
            Self::Pending => true,
            Self::InProgress => next != Self::Pending,
            Self::Success | Self::Failed | Self::Cancelled => false,
        }
    }
}
