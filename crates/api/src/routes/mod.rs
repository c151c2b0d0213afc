pub mod health;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::{activities, bundles, callback, workitems};
use crate::state::AppState;
use crate::ws;

/// Largest accepted drawing upload.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                      WebSocket (job notifications)
///
/// /appbundles                              local bundle packages (GET)
///
/// /aps/designautomation/engines            available engines (GET)
/// /aps/designautomation/appbundles         publish bundle (POST)
/// /aps/designautomation/activities         list (GET), define (POST)
/// /aps/designautomation/workitems          start job, multipart (POST)
/// /aps/designautomation/account            clear app data (DELETE)
///
/// /aps/callback/designautomation           completion webhook (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/appbundles", get(bundles::list_local_bundles))
        .nest("/aps/designautomation", automation_routes())
        .route(
            "/aps/callback/designautomation",
            post(callback::on_complete),
        )
}

fn automation_routes() -> Router<AppState> {
    Router::new()
        .route("/engines", get(activities::list_engines))
        .route("/appbundles", post(bundles::create_app_bundle))
        .route(
            "/activities",
            get(activities::list_activities).post(activities::create_activity),
        )
        .route(
            "/workitems",
            post(workitems::start_work_item).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/account", delete(activities::clear_account))
}
