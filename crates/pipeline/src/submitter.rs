use std::collections::BTreeMap;
use std::sync::Arc;

use daflow_automation::api::EngineApi;
use daflow_automation::models::{Verb, WorkItemArgument, WorkItemSpec};

use crate::error::SubmissionError;
use crate::stager::Artifact;
use crate::workitem::{WorkItem, ARG_ON_COMPLETE};

/// Binds an activity to concrete artifacts and submits the work item.
pub struct JobSubmitter {
    engine: Arc<dyn EngineApi>,
    callback_url: Option<String>,
}

impl JobSubmitter {
    /// With `callback_url` set, work items report completion to it.
    pub fn new(engine: Arc<dyn EngineApi>, callback_url: Option<String>) -> Self {
        Self {
            engine,
            callback_url,
        }
    }

    pub fn uses_callback(&self) -> bool {
        self.callback_url.is_some()
    }

    /// Submit `activity_id` over `input` and `output`.
    ///
    /// Local copies of the artifacts are removed once their descriptors
    /// exist, before the creation call. The returned item carries whatever
    /// status the engine answered with.
    pub async fn submit(
        &self,
        activity_id: &str,
        input: Artifact,
        output: Artifact,
        connection_id: &str,
    ) -> Result<WorkItem, SubmissionError> {
        let mut arguments: BTreeMap<String, WorkItemArgument> = BTreeMap::new();
        arguments.insert(input.name.clone(), input.descriptor.to_argument());
        arguments.insert(output.name.clone(), output.descriptor.to_argument());

        if let Some(callback) = &self.callback_url {
            let url = callback_target(callback, connection_id, &output.handle.key)?;
            arguments.insert(
                ARG_ON_COMPLETE.to_string(),
                WorkItemArgument {
                    url,
                    headers: BTreeMap::new(),
                    verb: Some(Verb::Post),
                    local_name: None,
                },
            );
        }

        for artifact in [&input, &output] {
            if let Some(path) = &artifact.local_path {
                discard_local(path).await;
            }
        }

        let spec = WorkItemSpec {
            activity_id: activity_id.to_string(),
            arguments,
        };
        let report = self.engine.create_work_item(&spec).await?;
        tracing::info!(
            work_item_id = %report.id,
            activity_id = %activity_id,
            status = %report.status,
            "Work item submitted"
        );

        let bound = BTreeMap::from([
            (input.name.clone(), input),
            (output.name.clone(), output),
        ]);
        Ok(WorkItem::from_submission(activity_id.to_string(), bound, report))
    }
}

/// `{callback}?id={connection}&outputFileName={key}`.
pub fn callback_target(
    callback: &str,
    connection_id: &str,
    output_key: &str,
) -> Result<String, SubmissionError> {
    let mut url = reqwest::Url::parse(callback)
        .map_err(|_| SubmissionError::InvalidCallbackUrl(callback.to_string()))?;
    url.query_pairs_mut()
        .append_pair("id", connection_id)
        .append_pair("outputFileName", output_key);
    Ok(url.into())
}

async fn discard_local(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed local staged file");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove local staged file");
        }
    }
}
