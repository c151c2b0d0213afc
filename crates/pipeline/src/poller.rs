//! Status polling.
//!
//! [`StatusPoller::monitor`] follows one work item from submission to a
//! terminal status. Every observed status, starting with the one the
//! submission returned, is relayed before the next poll is issued. The
//! loop ends on a terminal status, on the first error, when the deadline
//! passes, or when its cancellation token fires.

use std::sync::Arc;

use daflow_automation::api::EngineApi;
use daflow_automation::storage::ObjectHandle;
use daflow_core::status::WorkItemStatus;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::completion::CompletionRelay;
use crate::config::PollConfig;
use crate::error::PollingError;
use crate::notify::{ConnectionRelay, NotificationKind};
use crate::workitem::WorkItem;

/// How a monitor ended.
#[derive(Debug)]
pub enum MonitorOutcome {
    /// Reached a terminal status and ran the completion tail.
    Completed(WorkItemStatus),
    /// Stopped on an error, which was relayed to the connection.
    Abandoned(PollingError),
    /// Shut down before the work item finished.
    Cancelled,
}

/// Polls work items to completion.
pub struct StatusPoller {
    engine: Arc<dyn EngineApi>,
    completion: Arc<CompletionRelay>,
    config: PollConfig,
}

impl StatusPoller {
    pub fn new(
        engine: Arc<dyn EngineApi>,
        completion: Arc<CompletionRelay>,
        config: PollConfig,
    ) -> Self {
        Self {
            engine,
            completion,
            config,
        }
    }

    /// Follow `work_item` until it is done.
    pub async fn monitor(
        &self,
        mut work_item: WorkItem,
        relay: ConnectionRelay,
        cancel: CancellationToken,
    ) -> MonitorOutcome {
        let output = work_item.output().map(|a| a.handle.clone());
        match self.follow(&mut work_item, output, &relay, &cancel).await {
            Ok(Some(status)) => {
                tracing::info!(work_item_id = %work_item.id, status = %status, "Work item finished");
                MonitorOutcome::Completed(status)
            }
            Ok(None) => {
                tracing::info!(work_item_id = %work_item.id, "Work item monitor cancelled");
                MonitorOutcome::Cancelled
            }
            Err(err) => {
                tracing::error!(work_item_id = %work_item.id, error = %err, "Work item monitor abandoned");
                if let Err(closed) = relay.send(NotificationKind::Error, err.to_string()).await {
                    tracing::warn!(work_item_id = %work_item.id, error = %closed, "Could not relay monitor error");
                }
                MonitorOutcome::Abandoned(err)
            }
        }
    }

    // ---- private helpers ----

    /// `Ok(None)` means cancelled.
    async fn follow(
        &self,
        work_item: &mut WorkItem,
        output: Option<ObjectHandle>,
        relay: &ConnectionRelay,
        cancel: &CancellationToken,
    ) -> Result<Option<WorkItemStatus>, PollingError> {
        let started = Instant::now();
        relay
            .send(NotificationKind::Status, work_item.last_report.to_json_text())
            .await?;

        while !work_item.is_terminal() {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            // Checked after the sleep so no poll is issued past the deadline.
            let elapsed = started.elapsed();
            if elapsed >= self.config.max_duration {
                return Err(PollingError::DeadlineExceeded {
                    elapsed_secs: elapsed.as_secs(),
                });
            }

            let report = self
                .engine
                .work_item_status(&work_item.id)
                .await
                .map_err(PollingError::from_status)?;
            tracing::debug!(work_item_id = %work_item.id, status = %report.status, "Work item polled");
            relay
                .send(NotificationKind::Status, report.to_json_text())
                .await?;
            work_item.observe(&report);
        }

        match output {
            Some(handle) => {
                self.completion
                    .finish(relay, &work_item.last_report, &handle)
                    .await?
            }
            None => {
                tracing::warn!(work_item_id = %work_item.id, "Work item has no output artifact");
            }
        }
        Ok(Some(work_item.status))
    }
}
