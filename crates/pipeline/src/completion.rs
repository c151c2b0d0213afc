//! The terminal tail shared by polling and callbacks.

use std::sync::Arc;

use daflow_automation::api::EngineApi;
use daflow_automation::models::WorkItemStatusReport;
use daflow_automation::storage::ObjectHandle;
use daflow_core::status::WorkItemStatus;

use crate::error::PollingError;
use crate::notify::{ConnectionRelay, NotificationKind};
use crate::stager::ArtifactStager;

/// Relays the report and, on success, the output download URL.
pub struct CompletionRelay {
    engine: Arc<dyn EngineApi>,
    stager: Arc<ArtifactStager>,
}

impl CompletionRelay {
    pub fn new(engine: Arc<dyn EngineApi>, stager: Arc<ArtifactStager>) -> Self {
        Self { engine, stager }
    }

    /// Finish a terminal work item.
    ///
    /// The report is relayed whenever the engine produced one. The
    /// download URL is resolved and relayed only for `success`.
    pub async fn finish(
        &self,
        relay: &ConnectionRelay,
        report: &WorkItemStatusReport,
        output: &ObjectHandle,
    ) -> Result<(), PollingError> {
        if let Some(url) = &report.report_url {
            let text = self
                .engine
                .fetch_report(url)
                .await
                .map_err(PollingError::Report)?;
            relay.send(NotificationKind::Report, text).await?;
        }

        if report.status != WorkItemStatus::Success {
            tracing::info!(work_item_id = %report.id, status = %report.status, "Work item did not succeed");
            return Ok(());
        }

        let url = self
            .stager
            .download_url(output)
            .await
            .map_err(PollingError::DownloadUrl)?;
        relay.send(NotificationKind::DownloadResult, url).await?;
        tracing::info!(work_item_id = %report.id, key = %output.key, "Download URL relayed");
        Ok(())
    }
}
