//! Webhook completion path.
//!
//! When work items are submitted with a completion URL the engine posts
//! the final status there instead of being polled. [`CallbackReceiver`]
//! turns that payload into the same notifications the poller produces.

use std::sync::Arc;

use daflow_automation::models::{RawWorkItemStatus, WorkItemStatusReport};
use daflow_core::status::WorkItemStatus;

use crate::completion::CompletionRelay;
use crate::error::{CallbackParseError, PipelineError, PollingError};
use crate::notify::{ConnectionRelay, NotificationKind, Notifier};
use crate::stager::{is_staged_key, ArtifactRole, ArtifactStager};
use crate::workitem::ConnectionSubscription;

pub struct CallbackReceiver {
    notifier: Notifier,
    stager: Arc<ArtifactStager>,
    completion: Arc<CompletionRelay>,
}

impl CallbackReceiver {
    pub fn new(
        notifier: Notifier,
        stager: Arc<ArtifactStager>,
        completion: Arc<CompletionRelay>,
    ) -> Self {
        Self {
            notifier,
            stager,
            completion,
        }
    }

    /// Handle one webhook delivery for `connection_id`.
    ///
    /// An output name that is not a staged output key is rejected without
    /// notifying anyone. A payload that cannot be parsed is relayed as an
    /// error. Both are returned as [`CallbackParseError`].
    pub async fn on_callback(
        &self,
        connection_id: &str,
        output_name: &str,
        payload: &str,
    ) -> Result<WorkItemStatus, PipelineError> {
        if !is_staged_key(ArtifactRole::Output, output_name) {
            tracing::warn!(connection_id = %connection_id, output = %output_name, "Callback names a foreign output");
            return Err(CallbackParseError::ForeignOutput(output_name.to_string()).into());
        }

        let report = match parse_payload(payload) {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(connection_id = %connection_id, error = %err, "Malformed callback payload");
                self.relay_for(connection_id, None)
                    .send(NotificationKind::Error, err.to_string())
                    .await
                    .map_err(PollingError::from)?;
                return Err(err.into());
            }
        };
        tracing::info!(
            connection_id = %connection_id,
            work_item_id = %report.id,
            status = %report.status,
            "Callback received"
        );

        let relay = self.relay_for(connection_id, Some(report.id.clone()));
        // Same shape the poller relays, whatever extra fields the engine sent.
        relay
            .send(NotificationKind::Status, report.to_json_text())
            .await
            .map_err(PollingError::from)?;

        let output = self.stager.handle_for(output_name);
        if let Err(err) = self.completion.finish(&relay, &report, &output).await {
            tracing::error!(work_item_id = %report.id, error = %err, "Callback completion failed");
            if let Err(closed) = relay.send(NotificationKind::Error, err.to_string()).await {
                tracing::warn!(error = %closed, "Could not relay callback error");
            }
            return Err(err.into());
        }
        Ok(report.status)
    }

    fn relay_for(&self, connection_id: &str, work_item_id: Option<String>) -> ConnectionRelay {
        ConnectionRelay::new(
            self.notifier.clone(),
            ConnectionSubscription {
                connection_id: connection_id.to_string(),
                work_item_id,
            },
        )
    }
}

fn parse_payload(payload: &str) -> Result<WorkItemStatusReport, CallbackParseError> {
    let raw: RawWorkItemStatus = serde_json::from_str(payload)?;
    WorkItemStatusReport::try_from(raw).map_err(CallbackParseError::Incomplete)
}
