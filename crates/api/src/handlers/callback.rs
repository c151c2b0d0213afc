use axum::extract::{Query, State};
use axum::http::StatusCode;
use daflow_pipeline::error::PipelineError;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Query string the engine echoes back on completion.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackQuery {
    /// Connection the job was submitted for.
    pub id: String,
    /// Object key of the job's output.
    pub output_file_name: String,
}

/// POST /api/aps/callback/designautomation
///
/// Completion webhook. A malformed payload or an output name that is not a
/// staged output key is rejected with 400; any other
/// failure has already been relayed to the client, so the engine still
/// gets a 200 and does not retry.
pub async fn on_complete(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> AppResult<StatusCode> {
    match state
        .callbacks
        .on_callback(&query.id, &query.output_file_name, &body)
        .await
    {
        Ok(status) => {
            tracing::debug!(connection_id = %query.id, status = %status, "Callback handled");
            Ok(StatusCode::OK)
        }
        Err(err @ PipelineError::CallbackParse(_)) => Err(AppError::Pipeline(err)),
        Err(err) => {
            tracing::warn!(connection_id = %query.id, error = %err, "Callback handled with errors");
            Ok(StatusCode::OK)
        }
    }
}
