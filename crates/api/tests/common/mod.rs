//! Shared harness for API integration tests: in-memory engine and storage
//! behind the production router.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::Message;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::mpsc;
use tower::ServiceExt;

use daflow_api::config::ServerConfig;
use daflow_api::router::build_app_router;
use daflow_api::state::AppState;
use daflow_api::ws::WsManager;
use daflow_automation::api::{EngineApi, EngineApiError};
use daflow_automation::models::{
    ActivityRecord, ActivitySpec, Alias, AliasPatch, AliasSpec, AppBundleVersion, NewAppBundle,
    NewAppBundleVersion, Page, UploadParameters, Verb, WorkItemSpec, WorkItemStatusReport,
};
use daflow_automation::storage::{ObjectHandle, ObjectStore, StoreError};
use daflow_core::status::WorkItemStatus;
use daflow_pipeline::config::{PipelineConfig, PollConfig};
use daflow_pipeline::notify::NotificationSink;
use daflow_pipeline::AutomationServices;

pub const NICKNAME: &str = "nick";
pub const ENGINE: &str = "Autodesk.AutoCAD+24_1";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

fn pipeline_config(callback_url: Option<&str>) -> PipelineConfig {
    let mut config = PipelineConfig::new(NICKNAME);
    config.poll = PollConfig {
        interval: Duration::from_millis(5),
        max_duration: Duration::from_secs(5),
    };
    config.callback_url = callback_url.map(str::to_string);
    config
}

// ---------------------------------------------------------------------------
// StubEngine
// ---------------------------------------------------------------------------

/// Engine that accepts everything and finishes work items on the first poll.
#[derive(Default)]
pub struct StubEngine {
    pub calls: Mutex<Vec<String>>,
    pub activities: Mutex<Vec<String>>,
    pub submitted: Mutex<Vec<WorkItemSpec>>,
}

impl StubEngine {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn version(bundle: &str, version: u32) -> AppBundleVersion {
        AppBundleVersion {
            version,
            upload_parameters: UploadParameters {
                endpoint_url: format!("https://upload.example/{bundle}"),
                form_data: BTreeMap::new(),
            },
        }
    }

    fn report(id: &str, status: WorkItemStatus) -> WorkItemStatusReport {
        WorkItemStatusReport {
            id: id.to_string(),
            status,
            progress: None,
            report_url: None,
            stats: None,
        }
    }
}

#[async_trait::async_trait]
impl EngineApi for StubEngine {
    async fn list_engines(&self, _page: Option<&str>) -> Result<Page<String>, EngineApiError> {
        self.log("list_engines");
        Ok(Page {
            data: vec![
                "Autodesk.Revit+2024".to_string(),
                ENGINE.to_string(),
                "Autodesk.Inventor+2024".to_string(),
            ],
            pagination_token: None,
        })
    }

    async fn list_app_bundles(&self, _page: Option<&str>) -> Result<Page<String>, EngineApiError> {
        self.log("list_app_bundles");
        Ok(Page {
            data: Vec::new(),
            pagination_token: None,
        })
    }

    async fn create_app_bundle(
        &self,
        spec: &NewAppBundle,
    ) -> Result<AppBundleVersion, EngineApiError> {
        self.log(format!("create_app_bundle:{}", spec.id));
        Ok(Self::version(&spec.id, 1))
    }

    async fn create_app_bundle_version(
        &self,
        bundle: &str,
        _spec: &NewAppBundleVersion,
    ) -> Result<AppBundleVersion, EngineApiError> {
        self.log(format!("create_app_bundle_version:{bundle}"));
        Ok(Self::version(bundle, 2))
    }

    async fn create_app_bundle_alias(
        &self,
        bundle: &str,
        alias: &AliasSpec,
    ) -> Result<Alias, EngineApiError> {
        self.log(format!("create_app_bundle_alias:{bundle}"));
        Ok(Alias {
            id: alias.id.clone(),
            version: alias.version,
        })
    }

    async fn modify_app_bundle_alias(
        &self,
        _bundle: &str,
        alias: &str,
        patch: &AliasPatch,
    ) -> Result<Alias, EngineApiError> {
        Ok(Alias {
            id: alias.to_string(),
            version: patch.version,
        })
    }

    async fn upload_package(
        &self,
        _target: &UploadParameters,
        file_name: &str,
        _package: Vec<u8>,
    ) -> Result<(), EngineApiError> {
        self.log(format!("upload_package:{file_name}"));
        Ok(())
    }

    async fn list_activities(&self, _page: Option<&str>) -> Result<Page<String>, EngineApiError> {
        self.log("list_activities");
        Ok(Page {
            data: self.activities.lock().unwrap().clone(),
            pagination_token: None,
        })
    }

    async fn create_activity(&self, spec: &ActivitySpec) -> Result<ActivityRecord, EngineApiError> {
        self.log(format!("create_activity:{}", spec.id));
        self.activities
            .lock()
            .unwrap()
            .push(format!("{NICKNAME}.{}+dev", spec.id));
        Ok(ActivityRecord {
            id: spec.id.clone(),
            version: 1,
        })
    }

    async fn create_activity_alias(
        &self,
        _activity: &str,
        alias: &AliasSpec,
    ) -> Result<Alias, EngineApiError> {
        Ok(Alias {
            id: alias.id.clone(),
            version: alias.version,
        })
    }

    async fn create_work_item(
        &self,
        spec: &WorkItemSpec,
    ) -> Result<WorkItemStatusReport, EngineApiError> {
        self.log(format!("create_work_item:{}", spec.activity_id));
        self.submitted.lock().unwrap().push(spec.clone());
        Ok(Self::report("w1", WorkItemStatus::Pending))
    }

    async fn work_item_status(&self, id: &str) -> Result<WorkItemStatusReport, EngineApiError> {
        Ok(Self::report(id, WorkItemStatus::Success))
    }

    async fn fetch_report(&self, _report_url: &str) -> Result<String, EngineApiError> {
        Ok("report".to_string())
    }

    async fn delete_app(&self) -> Result<(), EngineApiError> {
        self.log("delete_app");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StubStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct StubStore {
    pub uploads: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl ObjectStore for StubStore {
    async fn create_bucket(&self, _bucket: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        _bytes: Vec<u8>,
    ) -> Result<ObjectHandle, StoreError> {
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(self.handle_for(bucket, key))
    }

    fn handle_for(&self, bucket: &str, key: &str) -> ObjectHandle {
        ObjectHandle {
            bucket: bucket.to_string(),
            key: key.to_string(),
            location: format!("urn:test:{bucket}/{key}"),
        }
    }

    async fn access_headers(
        &self,
        _handle: &ObjectHandle,
        _verb: Verb,
    ) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(BTreeMap::new())
    }

    async fn download_url(
        &self,
        handle: &ObjectHandle,
        _minutes_expiration: u32,
        _use_cdn: bool,
    ) -> Result<String, StoreError> {
        Ok(format!("https://download.example/{}", handle.key))
    }
}

// ---------------------------------------------------------------------------
// TestApp
// ---------------------------------------------------------------------------

/// The production router over stub upstreams, with its temp directories.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub engine: Arc<StubEngine>,
    pub store: Arc<StubStore>,
    pub bundles_dir: tempfile::TempDir,
    pub staging_dir: tempfile::TempDir,
}

impl TestApp {
    /// Polling mode.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Completion arrives by webhook.
    pub fn with_callback() -> Self {
        Self::build(Some("https://app.example/api/aps/callback/designautomation"))
    }

    fn build(callback_url: Option<&str>) -> Self {
        let engine = Arc::new(StubEngine::default());
        let store = Arc::new(StubStore::default());
        let ws_manager = Arc::new(WsManager::new());
        let bundles_dir = tempfile::tempdir().unwrap();
        let staging_dir = tempfile::tempdir().unwrap();

        let sink: Arc<dyn NotificationSink> = Arc::clone(&ws_manager) as Arc<dyn NotificationSink>;
        let (services, delivery) = AutomationServices::build(
            Arc::clone(&engine) as Arc<dyn EngineApi>,
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            sink,
            pipeline_config(callback_url),
        );
        tokio::spawn(delivery.run());

        let config = test_config();
        let state = AppState {
            config: Arc::new(config.clone()),
            ws_manager,
            registry: services.registry,
            orchestrator: services.orchestrator,
            callbacks: services.callbacks,
            bundles_dir: bundles_dir.path().to_path_buf(),
            staging_dir: staging_dir.path().to_path_buf(),
        };

        Self {
            router: build_app_router(state.clone(), &config),
            state,
            engine,
            store,
            bundles_dir,
            staging_dir,
        }
    }

    /// Register a fake browser connection and return its outbound queue.
    pub async fn connect(&self, conn_id: &str) -> mpsc::UnboundedReceiver<Message> {
        self.state.ws_manager.add(conn_id.to_string()).await
    }

    pub fn write_package(&self, name: &str) {
        std::fs::write(self.bundles_dir.path().join(format!("{name}.zip")), b"PK").unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method(Method::DELETE)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

pub const BOUNDARY: &str = "daflow-test-boundary";

/// Multipart body with optional `inputFile` and `data` parts.
pub fn multipart_body(file: Option<(&str, &[u8])>, data: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"inputFile\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(data) = data {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"data\"\r\n\r\n{data}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Collect the response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Next text frame queued for a connection, parsed as JSON.
pub async fn next_frame(rx: &mut mpsc::UnboundedReceiver<Message>) -> serde_json::Value {
    let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("connection channel closed");
    match message {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("Expected text frame, got {other:?}"),
    }
}
