use std::path::PathBuf;
use std::sync::Arc;

use daflow_pipeline::callback::CallbackReceiver;
use daflow_pipeline::orchestrator::JobOrchestrator;
use daflow_pipeline::registry::BundleRegistry;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    pub registry: Arc<BundleRegistry>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub callbacks: Arc<CallbackReceiver>,
    /// Directory holding local `*.zip` bundle packages.
    pub bundles_dir: PathBuf,
    /// Directory uploaded inputs are written to before staging.
    pub staging_dir: PathBuf,
}
