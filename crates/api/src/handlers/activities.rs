use axum::extract::State;
use axum::Json;
use daflow_pipeline::registry::ActivityOutcome;

use crate::error::AppResult;
use crate::handlers::bundles::ProvisionRequest;
use crate::response::DataResponse;
use crate::state::AppState;

/// Suffix turning a package name into its activity name.
pub const ACTIVITY_SUFFIX: &str = "Activity";

/// GET /api/aps/designautomation/engines
pub async fn list_engines(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<String>>>> {
    let engines = state.registry.available_engines().await?;
    Ok(Json(DataResponse { data: engines }))
}

/// POST /api/aps/designautomation/activities
///
/// Define the activity for a package's bundle unless it already exists.
pub async fn create_activity(
    State(state): State<AppState>,
    Json(input): Json<ProvisionRequest>,
) -> AppResult<Json<DataResponse<ActivityOutcome>>> {
    input.checked()?;
    let activity = format!("{}{ACTIVITY_SUFFIX}", input.zip_file_name);

    let outcome = state
        .registry
        .ensure_activity(&activity, &input.engine, &input.bundle_name())
        .await?;

    Ok(Json(DataResponse { data: outcome }))
}

/// GET /api/aps/designautomation/activities
pub async fn list_activities(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<String>>>> {
    let activities = state.registry.defined_activities().await?;
    Ok(Json(DataResponse { data: activities }))
}

/// DELETE /api/aps/designautomation/account
pub async fn clear_account(State(state): State<AppState>) -> AppResult<axum::http::StatusCode> {
    state.registry.clear_account().await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
