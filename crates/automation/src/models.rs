//! Typed request and response bodies for the engine API.
//!
//! Responses arrive as `Raw*` structs whose fields are all optional and
//! are converted into validated types with [`TryFrom`]. A response that
//! lacks a field the pipeline depends on is reported as an unexpected
//! shape instead of surfacing later as a missing value.

use std::collections::BTreeMap;

use daflow_core::status::WorkItemStatus;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// One page of a paginated listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Opaque continuation token; `None` on the last page.
    #[serde(default)]
    pub pagination_token: Option<String>,
}

/// HTTP verb an engine argument is fetched or written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    Head,
    Put,
    Post,
    Patch,
    Read,
}

/// Create an alias pointing at a version.
#[derive(Debug, Clone, Serialize)]
pub struct AliasSpec {
    pub id: String,
    pub version: u32,
}

/// Repoint an existing alias.
#[derive(Debug, Clone, Serialize)]
pub struct AliasPatch {
    pub version: u32,
}

/// Alias as returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Alias {
    pub id: String,
    pub version: u32,
}

// ---------------------------------------------------------------------------
// App bundles
// ---------------------------------------------------------------------------

/// Body for creating a bundle (implicitly version 1).
#[derive(Debug, Clone, Serialize)]
pub struct NewAppBundle {
    pub id: String,
    pub engine: String,
    pub description: String,
}

/// Body for adding a version to an existing bundle.
#[derive(Debug, Clone, Serialize)]
pub struct NewAppBundleVersion {
    pub engine: String,
    pub description: String,
}

/// Where and how to upload a bundle package.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadParameters {
    #[serde(rename = "endpointURL")]
    pub endpoint_url: String,
    /// Form fields that must accompany the `file` part. Null values are
    /// skipped when the form is built.
    #[serde(rename = "formData", default)]
    pub form_data: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAppBundleVersion {
    pub id: Option<String>,
    pub version: Option<u32>,
    pub upload_parameters: Option<UploadParameters>,
}

/// A freshly created bundle version, ready for its package upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppBundleVersion {
    pub version: u32,
    pub upload_parameters: UploadParameters,
}

impl TryFrom<RawAppBundleVersion> for AppBundleVersion {
    type Error = String;

    fn try_from(raw: RawAppBundleVersion) -> Result<Self, Self::Error> {
        let version = raw
            .version
            .filter(|v| *v >= 1)
            .ok_or_else(|| format!("bundle {:?} response has no version", raw.id))?;
        let upload_parameters = raw
            .upload_parameters
            .ok_or_else(|| format!("bundle {:?} response has no upload parameters", raw.id))?;
        Ok(Self {
            version,
            upload_parameters,
        })
    }
}

// ---------------------------------------------------------------------------
// Activities
// ---------------------------------------------------------------------------

/// One declared argument of an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityParameter {
    pub verb: Verb,
    pub description: String,
    pub local_name: String,
    pub ondemand: bool,
    pub required: bool,
    pub zip: bool,
}

/// A string-valued activity setting (e.g. an inline script).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringSetting {
    pub value: String,
}

/// Body for creating an activity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySpec {
    pub id: String,
    pub engine: String,
    pub command_line: Vec<String>,
    pub appbundles: Vec<String>,
    pub parameters: BTreeMap<String, ActivityParameter>,
    pub settings: BTreeMap<String, StringSetting>,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawActivity {
    pub id: Option<String>,
    pub version: Option<u32>,
}

/// An activity as acknowledged by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    pub id: String,
    pub version: u32,
}

impl TryFrom<RawActivity> for ActivityRecord {
    type Error = String;

    fn try_from(raw: RawActivity) -> Result<Self, Self::Error> {
        let id = raw.id.ok_or("activity response has no id")?;
        let version = raw
            .version
            .ok_or_else(|| format!("activity '{id}' response has no version"))?;
        Ok(Self { id, version })
    }
}

// ---------------------------------------------------------------------------
// Work items
// ---------------------------------------------------------------------------

/// A concrete argument value bound into a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemArgument {
    pub url: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verb: Option<Verb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_name: Option<String>,
}

/// Body for creating a work item.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemSpec {
    pub activity_id: String,
    pub arguments: BTreeMap<String, WorkItemArgument>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWorkItemStatus {
    pub id: Option<String>,
    pub status: Option<WorkItemStatus>,
    pub progress: Option<String>,
    pub report_url: Option<String>,
    pub stats: Option<serde_json::Value>,
}

/// One status observation of a work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemStatusReport {
    pub id: String,
    pub status: WorkItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
}

impl TryFrom<RawWorkItemStatus> for WorkItemStatusReport {
    type Error = String;

    fn try_from(raw: RawWorkItemStatus) -> Result<Self, Self::Error> {
        let id = raw.id.ok_or("work item response has no id")?;
        let status = raw
            .status
            .ok_or_else(|| format!("work item '{id}' response has no status"))?;
        Ok(Self {
            id,
            status,
            progress: raw.progress,
            report_url: raw.report_url,
            stats: raw.stats,
        })
    }
}

impl WorkItemStatusReport {
    /// JSON text relayed to clients for this observation.
    pub fn to_json_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.status.to_string())
    }
}
