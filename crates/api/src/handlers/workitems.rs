use std::path::{Path, PathBuf};

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use daflow_pipeline::orchestrator::{SubmitRequest, SubmittedJob};
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// JSON carried in the `data` part of a work item upload.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemData {
    /// Activity name, optionally `name+alias`.
    #[validate(length(min = 1, max = 255))]
    pub activity_name: String,
    /// Id announced to the client when its WebSocket connected.
    #[validate(length(min = 1, max = 64))]
    pub browser_connection_id: String,
}

/// POST /api/aps/designautomation/workitems
///
/// Accepts a multipart form with an `inputFile` part and a `data` part
/// holding [`WorkItemData`]. The input is saved under the staging dir and
/// handed to the orchestrator, which removes it once staged.
pub async fn start_work_item(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<SubmittedJob>>)> {
    let mut file_data: Option<(String, Vec<u8>)> = None;
    let mut data: Option<WorkItemData> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "inputFile" => {
                let filename = field
                    .file_name()
                    .map(sanitize_file_name)
                    .ok_or_else(|| AppError::BadRequest("'inputFile' has no file name".into()))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                file_data = Some((filename, bytes.to_vec()));
            }
            "data" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let parsed: WorkItemData = serde_json::from_str(&text)
                    .map_err(|e| AppError::BadRequest(format!("Invalid 'data' part: {e}")))?;
                data = Some(parsed);
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file_data.ok_or_else(|| AppError::BadRequest("Missing required 'inputFile' field".into()))?;
    let data = data.ok_or_else(|| AppError::BadRequest("Missing required 'data' field".into()))?;
    data.validate()?;

    if filename.is_empty() {
        return Err(AppError::BadRequest("Input file name is empty".into()));
    }

    // One directory per upload so identical client file names never collide.
    let upload_dir = state.staging_dir.join(uuid::Uuid::new_v4().to_string());
    let input_path = save_upload(&upload_dir, &filename, &bytes).await?;

    let result = state
        .orchestrator
        .start(SubmitRequest {
            activity_name: data.activity_name,
            connection_id: data.browser_connection_id,
            input_path: input_path.clone(),
            input_file_name: filename,
        })
        .await;

    discard_upload(&upload_dir, &input_path).await;
    let job = result?;

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: job })))
}

/// Final path component of a client-supplied name.
fn sanitize_file_name(raw: &str) -> String {
    Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string()
}

async fn save_upload(dir: &Path, filename: &str, bytes: &[u8]) -> AppResult<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let path = dir.join(filename);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    Ok(path)
}

/// Remove whatever is left of an upload. The orchestrator normally deletes
/// the file itself; failures here only leave litter behind.
async fn discard_upload(dir: &Path, input_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(input_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %input_path.display(), error = %e, "Failed to remove upload");
        }
    }
    if let Err(e) = tokio::fs::remove_dir(dir).await {
        tracing::debug!(dir = %dir.display(), error = %e, "Upload dir not removed");
    }
}
