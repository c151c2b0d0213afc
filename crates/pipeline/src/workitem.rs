//! Work items and the connections subscribed to them.

use std::collections::BTreeMap;

use daflow_automation::models::WorkItemStatusReport;
use daflow_core::status::WorkItemStatus;
use daflow_core::types::{ConnectionId, Timestamp, WorkItemId};

use crate::stager::Artifact;

/// Argument name of the file the engine opens.
pub const ARG_INPUT_FILE: &str = "inputFile";

/// Argument name of the file the engine writes.
pub const ARG_OUTPUT_FILE: &str = "outputFile";

/// Argument name of the completion webhook.
pub const ARG_ON_COMPLETE: &str = "onComplete";

/// A submitted job as tracked locally.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub activity_id: String,
    pub arguments: BTreeMap<String, Artifact>,
    pub status: WorkItemStatus,
    pub report_url: Option<String>,
    pub last_report: WorkItemStatusReport,
    pub submitted_at: Timestamp,
}

impl WorkItem {
    /// Build a work item from the engine's answer to its creation.
    pub fn from_submission(
        activity_id: String,
        arguments: BTreeMap<String, Artifact>,
        report: WorkItemStatusReport,
    ) -> Self {
        Self {
            id: report.id.clone(),
            activity_id,
            arguments,
            status: report.status,
            report_url: report.report_url.clone(),
            last_report: report,
            submitted_at: chrono::Utc::now(),
        }
    }

    /// Apply a status observation. Returns `false` (and leaves the item
    /// unchanged) when the observation would move the item backwards or
    /// out of a terminal state.
    pub fn observe(&mut self, report: &WorkItemStatusReport) -> bool {
        let current = self.status.phase();
        let next = report.status.phase();
        if current != next && !current.can_transition_to(next) {
            tracing::warn!(
                work_item_id = %self.id,
                from = %self.status,
                to = %report.status,
                "Ignoring out-of-order status"
            );
            return false;
        }
        self.status = report.status;
        if report.report_url.is_some() {
            self.report_url = report.report_url.clone();
        }
        self.last_report = report.clone();
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The artifact bound to `outputFile`.
    pub fn output(&self) -> Option<&Artifact> {
        self.arguments.get(ARG_OUTPUT_FILE)
    }
}

/// Which connection hears about which job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionSubscription {
    pub connection_id: ConnectionId,
    /// Unknown until the engine has accepted the work item (or when the
    /// job reports back by callback).
    pub work_item_id: Option<WorkItemId>,
}
