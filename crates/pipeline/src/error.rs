//! Error taxonomy of the pipeline.
//!
//! Each stage has its own enum so callers can tell a bucket problem from
//! an upload problem, or a provisioning failure from a submission
//! failure. [`PipelineError`] collects them for code that spans stages.

use std::path::PathBuf;

use daflow_automation::api::EngineApiError;
use daflow_automation::storage::StoreError;
use daflow_core::engine_kind::EngineKindError;

use crate::notify::NotifierClosed;

/// Artifact staging failed.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Failed to provision bucket '{bucket}': {source}")]
    BucketProvisioning { bucket: String, source: StoreError },

    #[error("Failed to read staged file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to upload object '{key}': {source}")]
    Upload { key: String, source: StoreError },

    #[error("Failed to build access for object '{key}': {source}")]
    Access { key: String, source: StoreError },
}

/// Bundle or activity provisioning failed.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("Bundle package not found at '{}'", .0.display())]
    PackageMissing(PathBuf),

    #[error("Failed to read bundle package '{}': {source}", .path.display())]
    PackageRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The version exists remotely but its package is incomplete.
    #[error("Package upload for bundle '{bundle}' version {version} failed: {source}")]
    PackageUpload {
        bundle: String,
        version: u32,
        source: EngineApiError,
    },

    #[error("Unexpected engine response: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid activity template: {0}")]
    InvalidTemplate(String),

    #[error("Engine request failed: {0}")]
    Remote(EngineApiError),
}

impl From<EngineApiError> for ProvisioningError {
    fn from(err: EngineApiError) -> Self {
        match err {
            EngineApiError::UnexpectedShape(msg) => Self::UnexpectedResponse(msg),
            other => Self::Remote(other),
        }
    }
}

/// Work-item creation failed.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Unexpected engine response: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid callback URL '{0}'")]
    InvalidCallbackUrl(String),

    #[error("Engine request failed: {0}")]
    Remote(EngineApiError),
}

impl From<EngineApiError> for SubmissionError {
    fn from(err: EngineApiError) -> Self {
        match err {
            EngineApiError::UnexpectedShape(msg) => Self::UnexpectedResponse(msg),
            other => Self::Remote(other),
        }
    }
}

/// Following a work item to completion failed.
#[derive(Debug, thiserror::Error)]
pub enum PollingError {
    #[error("Status request failed: {0}")]
    Status(EngineApiError),

    #[error("Malformed status payload: {0}")]
    Malformed(String),

    #[error("Failed to fetch report: {0}")]
    Report(EngineApiError),

    #[error("Failed to resolve download URL: {0}")]
    DownloadUrl(StoreError),

    #[error(transparent)]
    Relay(#[from] NotifierClosed),

    #[error("Work item still not terminal after {elapsed_secs}s")]
    DeadlineExceeded { elapsed_secs: u64 },
}

impl PollingError {
    /// Classify an error from a status request.
    pub fn from_status(err: EngineApiError) -> Self {
        match err {
            EngineApiError::UnexpectedShape(msg) => Self::Malformed(msg),
            EngineApiError::Request(e) if e.is_decode() => Self::Malformed(e.to_string()),
            other => Self::Status(other),
        }
    }
}

/// A webhook payload could not be understood.
#[derive(Debug, thiserror::Error)]
pub enum CallbackParseError {
    #[error("Callback payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Callback payload incomplete: {0}")]
    Incomplete(String),

    #[error("Callback output '{0}' is not a staged output object")]
    ForeignOutput(String),
}

/// Any pipeline failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error(transparent)]
    UnsupportedEngine(#[from] EngineKindError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Polling(#[from] PollingError),

    #[error(transparent)]
    CallbackParse(#[from] CallbackParseError),
}
