//! Job orchestration.
//!
//! [`JobOrchestrator::start`] stages a job's artifacts, submits the work
//! item and, unless completion arrives by webhook, spawns one monitor task
//! per job. Every monitor runs under a child of the orchestrator's master
//! cancellation token so [`JobOrchestrator::shutdown`] can stop them all.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use daflow_core::types::{ConnectionId, WorkItemId};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::notify::{ConnectionRelay, Notifier};
use crate::poller::{MonitorOutcome, StatusPoller};
use crate::stager::ArtifactStager;
use crate::submitter::JobSubmitter;
use crate::workitem::{ConnectionSubscription, ARG_INPUT_FILE, ARG_OUTPUT_FILE};

/// How long shutdown waits for monitors to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A job as requested by a client.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// `name+alias` of an activity owned by this app.
    pub activity_name: String,
    pub connection_id: ConnectionId,
    /// Uploaded input saved locally; removed once staged.
    pub input_path: PathBuf,
    /// Client-side file name of the input.
    pub input_file_name: String,
}

/// Acknowledgement of an accepted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedJob {
    pub work_item_id: WorkItemId,
    #[serde(skip)]
    pub output_key: String,
    #[serde(skip)]
    pub monitored: bool,
}

pub struct JobOrchestrator {
    config: PipelineConfig,
    stager: Arc<ArtifactStager>,
    submitter: JobSubmitter,
    poller: Arc<StatusPoller>,
    notifier: Notifier,
    subscriptions: Arc<RwLock<HashMap<WorkItemId, ConnectionSubscription>>>,
    tracker: TaskTracker,
    /// Master token, cancelled on shutdown.
    cancel: CancellationToken,
}

impl JobOrchestrator {
    pub fn new(
        config: PipelineConfig,
        stager: Arc<ArtifactStager>,
        submitter: JobSubmitter,
        poller: Arc<StatusPoller>,
        notifier: Notifier,
    ) -> Self {
        Self {
            config,
            stager,
            submitter,
            poller,
            notifier,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Stage, submit and start following a job.
    pub async fn start(&self, request: SubmitRequest) -> Result<SubmittedJob, PipelineError> {
        let activity_id = self.config.owned_activity_id(&request.activity_name);

        let input = self
            .stager
            .stage_input(ARG_INPUT_FILE, &request.input_path)
            .await?;
        let output = self
            .stager
            .reserve_output(ARG_OUTPUT_FILE, &request.input_file_name)
            .await?;
        let output_key = output.handle.key.clone();

        let work_item = self
            .submitter
            .submit(&activity_id, input, output, &request.connection_id)
            .await?;
        let work_item_id = work_item.id.clone();

        if self.submitter.uses_callback() {
            tracing::info!(
                work_item_id = %work_item_id,
                connection_id = %request.connection_id,
                "Completion will arrive by callback"
            );
            return Ok(SubmittedJob {
                work_item_id,
                output_key,
                monitored: false,
            });
        }

        let subscription = ConnectionSubscription {
            connection_id: request.connection_id.clone(),
            work_item_id: Some(work_item_id.clone()),
        };
        self.subscriptions
            .write()
            .await
            .insert(work_item_id.clone(), subscription.clone());

        let relay = ConnectionRelay::new(self.notifier.clone(), subscription);
        let poller = Arc::clone(&self.poller);
        let subscriptions = Arc::clone(&self.subscriptions);
        let cancel = self.cancel.child_token();
        let id = work_item_id.clone();

        self.tracker.spawn(async move {
            let outcome = poller.monitor(work_item, relay, cancel).await;
            subscriptions.write().await.remove(&id);
            if let MonitorOutcome::Abandoned(err) = &outcome {
                tracing::debug!(work_item_id = %id, error = %err, "Monitor ended with error");
            }
        });

        tracing::info!(
            work_item_id = %work_item_id,
            connection_id = %request.connection_id,
            "Job monitor started"
        );
        Ok(SubmittedJob {
            work_item_id,
            output_key,
            monitored: true,
        })
    }

    /// Number of jobs currently being monitored.
    pub async fn active_jobs(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Connection subscribed to a monitored work item.
    pub async fn subscription(&self, work_item_id: &str) -> Option<ConnectionSubscription> {
        self.subscriptions.read().await.get(work_item_id).cloned()
    }

    /// Cancel every monitor and wait briefly for them to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job orchestrator");
        self.cancel.cancel();
        self.tracker.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Job monitors did not stop in time"
            );
        }
        tracing::info!("Job orchestrator shut down complete");
    }
}
