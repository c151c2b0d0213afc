//! In-memory fakes for the engine, object storage and notification sink.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use daflow_automation::api::{EngineApi, EngineApiError};
use daflow_automation::models::{
    ActivityRecord, ActivitySpec, Alias, AliasPatch, AliasSpec, AppBundleVersion, NewAppBundle,
    NewAppBundleVersion, Page, UploadParameters, Verb, WorkItemSpec, WorkItemStatusReport,
};
use daflow_automation::storage::{ObjectHandle, ObjectStore, StoreError};
use daflow_core::status::WorkItemStatus;
use daflow_pipeline::config::{PipelineConfig, PollConfig};
use daflow_pipeline::notify::{DeliveryError, JobNotification, NotificationKind, NotificationSink};

pub const NICKNAME: &str = "nick";
pub const WORK_ITEM_ID: &str = "w1";
pub const REPORT_URL: &str = "https://reports.example/w1.txt";
pub const REPORT_TEXT: &str = "Xref report";

/// Pipeline configuration with a millisecond poll cadence.
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::new(NICKNAME);
    config.poll = PollConfig {
        interval: Duration::from_millis(5),
        max_duration: Duration::from_secs(5),
    };
    config
}

pub fn status_report(status: WorkItemStatus, report_url: Option<&str>) -> WorkItemStatusReport {
    WorkItemStatusReport {
        id: WORK_ITEM_ID.to_string(),
        status,
        progress: None,
        report_url: report_url.map(str::to_string),
        stats: None,
    }
}

// ---------------------------------------------------------------------------
// FakeEngine
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeEngine {
    /// Every call in order, e.g. `create_app_bundle:XAppBundle`.
    pub calls: Mutex<Vec<String>>,
    /// Latest version per bundle name.
    pub bundle_versions: Mutex<HashMap<String, u32>>,
    /// Alias target per `bundle/alias`.
    pub aliases: Mutex<HashMap<String, u32>>,
    pub activities: Mutex<Vec<String>>,
    pub engines: Vec<Vec<String>>,
    pub fail_upload: AtomicBool,
    /// When set, bundle listings come back empty.
    pub hide_bundles: AtomicBool,
    /// Status returned by the work-item creation call.
    pub initial_status: Mutex<Option<WorkItemStatus>>,
    /// Statuses handed out by successive polls.
    pub statuses: Mutex<VecDeque<WorkItemStatus>>,
    /// When empty, polls fail with a server error.
    pub fail_polls_when_drained: AtomicBool,
    pub submitted: Mutex<Vec<WorkItemSpec>>,
    pub polls: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the bundle already exists at `version` under alias `dev`.
    pub fn with_bundle(self, name: &str, version: u32) -> Self {
        self.bundle_versions
            .lock()
            .unwrap()
            .insert(name.to_string(), version);
        self.aliases
            .lock()
            .unwrap()
            .insert(format!("{name}/dev"), version);
        self
    }

    pub fn with_activity(self, qualified_id: &str) -> Self {
        self.activities
            .lock()
            .unwrap()
            .push(qualified_id.to_string());
        self
    }

    pub fn with_engine_pages(mut self, pages: Vec<Vec<&str>>) -> Self {
        self.engines = pages
            .into_iter()
            .map(|p| p.into_iter().map(str::to_string).collect())
            .collect();
        self
    }

    /// Creation answers `initial`, then polls walk `polls`.
    pub fn with_statuses(self, initial: WorkItemStatus, polls: &[WorkItemStatus]) -> Self {
        *self.initial_status.lock().unwrap() = Some(initial);
        self.statuses.lock().unwrap().extend(polls.iter().copied());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn alias_target(&self, bundle: &str) -> Option<u32> {
        self.aliases
            .lock()
            .unwrap()
            .get(&format!("{bundle}/dev"))
            .copied()
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn new_version(&self, bundle: &str, version: u32) -> AppBundleVersion {
        self.bundle_versions
            .lock()
            .unwrap()
            .insert(bundle.to_string(), version);
        AppBundleVersion {
            version,
            upload_parameters: UploadParameters {
                endpoint_url: format!("https://upload.example/{bundle}/{version}"),
                form_data: BTreeMap::from([("key".to_string(), Some(format!("{bundle}-{version}")))]),
            },
        }
    }

    fn single_page(data: Vec<String>) -> Page<String> {
        Page {
            data,
            pagination_token: None,
        }
    }
}

#[async_trait::async_trait]
impl EngineApi for FakeEngine {
    async fn list_engines(&self, page: Option<&str>) -> Result<Page<String>, EngineApiError> {
        self.log(format!("list_engines:{}", page.unwrap_or("")));
        let index: usize = page.and_then(|p| p.parse().ok()).unwrap_or(0);
        let data = self.engines.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < self.engines.len()).then(|| (index + 1).to_string());
        Ok(Page {
            data,
            pagination_token: next,
        })
    }

    async fn list_app_bundles(&self, _page: Option<&str>) -> Result<Page<String>, EngineApiError> {
        self.log("list_app_bundles");
        if self.hide_bundles.load(Ordering::SeqCst) {
            return Ok(Self::single_page(Vec::new()));
        }
        // One id per alias, plus the engine-managed `$LATEST`.
        let mut ids: Vec<String> = self
            .bundle_versions
            .lock()
            .unwrap()
            .keys()
            .map(|name| format!("{NICKNAME}.{name}+$LATEST"))
            .collect();
        ids.extend(self.aliases.lock().unwrap().keys().map(|key| {
            let (bundle, alias) = key.split_once('/').unwrap();
            format!("{NICKNAME}.{bundle}+{alias}")
        }));
        ids.sort();
        Ok(Self::single_page(ids))
    }

    async fn create_app_bundle(
        &self,
        spec: &NewAppBundle,
    ) -> Result<AppBundleVersion, EngineApiError> {
        self.log(format!("create_app_bundle:{}", spec.id));
        if self.bundle_versions.lock().unwrap().contains_key(&spec.id) {
            return Err(conflict());
        }
        Ok(self.new_version(&spec.id, 1))
    }

    async fn create_app_bundle_version(
        &self,
        bundle: &str,
        _spec: &NewAppBundleVersion,
    ) -> Result<AppBundleVersion, EngineApiError> {
        self.log(format!("create_app_bundle_version:{bundle}"));
        let next = self
            .bundle_versions
            .lock()
            .unwrap()
            .get(bundle)
            .copied()
            .unwrap_or(0)
            + 1;
        Ok(self.new_version(bundle, next))
    }

    async fn create_app_bundle_alias(
        &self,
        bundle: &str,
        alias: &AliasSpec,
    ) -> Result<Alias, EngineApiError> {
        self.log(format!("create_app_bundle_alias:{bundle}:{}", alias.version));
        let mut aliases = self.aliases.lock().unwrap();
        let key = format!("{bundle}/{}", alias.id);
        if aliases.contains_key(&key) {
            return Err(conflict());
        }
        aliases.insert(key, alias.version);
        Ok(Alias {
            id: alias.id.clone(),
            version: alias.version,
        })
    }

    async fn modify_app_bundle_alias(
        &self,
        bundle: &str,
        alias: &str,
        patch: &AliasPatch,
    ) -> Result<Alias, EngineApiError> {
        self.log(format!("modify_app_bundle_alias:{bundle}:{}", patch.version));
        self.aliases
            .lock()
            .unwrap()
            .insert(format!("{bundle}/{alias}"), patch.version);
        Ok(Alias {
            id: alias.to_string(),
            version: patch.version,
        })
    }

    async fn upload_package(
        &self,
        target: &UploadParameters,
        _file_name: &str,
        _package: Vec<u8>,
    ) -> Result<(), EngineApiError> {
        self.log(format!("upload_package:{}", target.endpoint_url));
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(EngineApiError::ApiError {
                status: 403,
                body: "signature expired".into(),
            });
        }
        Ok(())
    }

    async fn list_activities(&self, _page: Option<&str>) -> Result<Page<String>, EngineApiError> {
        self.log("list_activities");
        Ok(Self::single_page(self.activities.lock().unwrap().clone()))
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
        activity: &str,
        alias: &AliasSpec,
    ) -> Result<Alias, EngineApiError> {
        self.log(format!("create_activity_alias:{activity}:{}", alias.version));
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
        let status = self
            .initial_status
            .lock()
            .unwrap()
            .unwrap_or(WorkItemStatus::Pending);
        Ok(status_report(status, None))
    }

    async fn work_item_status(&self, id: &str) -> Result<WorkItemStatusReport, EngineApiError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.log(format!("work_item_status:{id}"));
        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(status) => {
                let report_url = status.is_terminal().then_some(REPORT_URL);
                Ok(status_report(status, report_url))
            }
            None if self.fail_polls_when_drained.load(Ordering::SeqCst) => {
                Err(EngineApiError::ApiError {
                    status: 500,
                    body: "unavailable".into(),
                })
            }
            None => Ok(status_report(WorkItemStatus::InProgress, None)),
        }
    }

    async fn fetch_report(&self, report_url: &str) -> Result<String, EngineApiError> {
        self.log(format!("fetch_report:{report_url}"));
        Ok(REPORT_TEXT.to_string())
    }

    async fn delete_app(&self) -> Result<(), EngineApiError> {
        self.log("delete_app");
        Ok(())
    }
}

fn conflict() -> EngineApiError {
    EngineApiError::ApiError {
        status: 409,
        body: "exists".into(),
    }
}

// ---------------------------------------------------------------------------
// FakeStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeStore {
    pub bucket_exists: AtomicBool,
    pub bucket_creations: AtomicUsize,
    pub uploads: Mutex<Vec<(String, String, usize)>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(_, key, _)| key.clone())
            .collect()
    }
}

pub fn download_url_for(key: &str) -> String {
    format!("https://download.example/{key}")
}

#[async_trait::async_trait]
impl ObjectStore for FakeStore {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.bucket_creations.fetch_add(1, Ordering::SeqCst);
        if self.bucket_exists.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Conflict(format!("{bucket} exists")));
        }
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<ObjectHandle, StoreError> {
        self.uploads
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string(), bytes.len()));
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
        verb: Verb,
    ) -> Result<BTreeMap<String, String>, StoreError> {
        let mut headers = BTreeMap::from([("Authorization".to_string(), "Bearer t".to_string())]);
        if verb == Verb::Put {
            headers.insert("x-ms-blob-type".to_string(), "BlockBlob".to_string());
        }
        Ok(headers)
    }

    async fn download_url(
        &self,
        handle: &ObjectHandle,
        _minutes_expiration: u32,
        _use_cdn: bool,
    ) -> Result<String, StoreError> {
        Ok(download_url_for(&handle.key))
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<JobNotification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<JobNotification> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: NotificationKind) -> Vec<JobNotification> {
        self.all().into_iter().filter(|n| n.kind == kind).collect()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.of_kind(kind).len()
    }

    /// Wait until at least `n` notifications arrived.
    pub async fn wait_for(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.delivered.lock().unwrap().len() < n {
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "Expected {n} notifications, got {:?}",
                    self.delivered.lock().unwrap()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: &JobNotification) -> Result<(), DeliveryError> {
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Write `contents` to `dir/name` and return the path.
pub fn write_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
