use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use daflow_api::config::{AutomationConfig, ServerConfig};
use daflow_api::router::build_app_router;
use daflow_api::state::AppState;
use daflow_api::ws;
use daflow_automation::api::DesignAutomationClient;
use daflow_automation::auth::{TokenProvider, TwoLeggedAuth};
use daflow_automation::storage::OssClient;
use daflow_pipeline::notify::NotificationSink;
use daflow_pipeline::AutomationServices;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "daflow_api=debug,daflow_pipeline=debug,daflow_automation=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let automation = AutomationConfig::from_env();
    tracing::info!(
        engine_url = %automation.engine_url(),
        callback = automation.callback_url.is_some(),
        "Loaded automation configuration"
    );

    // --- Upstream clients ---
    let http = reqwest::Client::builder()
        .timeout(automation.http_timeout)
        .build()
        .expect("Failed to build HTTP client");

    let tokens: Arc<dyn TokenProvider> = Arc::new(TwoLeggedAuth::new(
        http.clone(),
        automation.token_url(),
        automation.client_id.clone(),
        automation.client_secret.clone(),
        automation.scopes.clone(),
    ));
    let engine = Arc::new(DesignAutomationClient::new(
        http.clone(),
        automation.engine_url(),
        Arc::clone(&tokens),
    ));
    let store = Arc::new(OssClient::new(
        http,
        automation.storage_url(),
        automation.storage_region.clone(),
        tokens,
    ));

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- Pipeline ---
    let sink: Arc<dyn NotificationSink> = Arc::clone(&ws_manager) as Arc<dyn NotificationSink>;
    let (services, delivery) =
        AutomationServices::build(engine, store, sink, automation.pipeline_config());
    let delivery_handle = tokio::spawn(delivery.run());
    tracing::info!("Pipeline services started");

    tokio::fs::create_dir_all(&automation.staging_dir)
        .await
        .expect("Failed to create staging directory");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        registry: services.registry,
        orchestrator: Arc::clone(&services.orchestrator),
        callbacks: services.callbacks,
        bundles_dir: automation.bundles_dir.clone(),
        staging_dir: automation.staging_dir.clone(),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop job monitors first; they may still be relaying notifications.
    let orchestrator = services.orchestrator;
    orchestrator.shutdown().await;
    tracing::info!("Job monitors stopped");

    // Dropping the last notifier closes the delivery channel.
    drop(orchestrator);
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(shutdown_timeout, delivery_handle)
        .await
        .is_err()
    {
        tracing::warn!("Notification delivery did not drain in time");
    }

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
