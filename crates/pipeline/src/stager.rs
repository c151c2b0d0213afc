//! Artifact staging.
//!
//! [`ArtifactStager`] uploads job inputs to object storage, reserves the
//! object the engine will write its output to, and turns both into
//! verb-scoped [`AccessDescriptor`]s the engine can use. Object keys are
//! salted with the submission time so repeated submissions of the same
//! file never overwrite each other.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use daflow_automation::models::{Verb, WorkItemArgument};
use daflow_automation::storage::{ObjectHandle, ObjectStore, StoreError};
use daflow_core::types::Timestamp;
use tokio::sync::OnceCell;

use crate::error::StagingError;

/// Local name the engine writes the output file under.
pub const OUTPUT_LOCAL_NAME: &str = "outputFile.txt";

/// Which side of a job an artifact is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactRole {
    Input,
    Output,
}

impl ArtifactRole {
    pub fn label(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// How the engine reaches an artifact: URL, headers, verb and the file
/// name it sees locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDescriptor {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub verb: Verb,
    pub local_name: Option<String>,
}

impl AccessDescriptor {
    /// Work-item argument form. `GET` is the engine default and is left
    /// implicit.
    pub fn to_argument(&self) -> WorkItemArgument {
        WorkItemArgument {
            url: self.url.clone(),
            headers: self.headers.clone(),
            verb: (self.verb != Verb::Get).then_some(self.verb),
            local_name: self.local_name.clone(),
        }
    }
}

/// An input or output file bound to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Logical argument name (`inputFile`, `outputFile`).
    pub name: String,
    pub handle: ObjectHandle,
    pub descriptor: AccessDescriptor,
    /// Local copy that can be discarded once the descriptor exists.
    pub local_path: Option<PathBuf>,
}

/// Build an access descriptor for `handle`. Performs no I/O.
pub fn build_access_descriptor(
    handle: &ObjectHandle,
    verb: Verb,
    headers: BTreeMap<String, String>,
    local_name: Option<&str>,
) -> AccessDescriptor {
    AccessDescriptor {
        url: handle.location.clone(),
        headers,
        verb,
        local_name: local_name.map(str::to_string),
    }
}

/// Storage key for a staged object: `{timestamp}_{salt}_{role}_{name}`.
pub fn object_key(role: ArtifactRole, file_name: &str, at: Timestamp) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}",
        at.format("%Y%m%d%H%M%S%3f"),
        &salt[..8],
        role.label(),
        file_name
    )
}

/// Whether `key` has the shape [`object_key`] produces for `role`.
pub fn is_staged_key(role: ArtifactRole, key: &str) -> bool {
    let mut parts = key.splitn(4, '_');
    let (Some(stamp), Some(salt), Some(label), Some(name)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    stamp.len() == 17
        && stamp.bytes().all(|b| b.is_ascii_digit())
        && salt.len() == 8
        && salt.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        && label == role.label()
        && !name.is_empty()
        && !name.contains('/')
}

/// Uploads artifacts and describes them for the engine.
pub struct ArtifactStager {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    download_url_minutes: u32,
    download_use_cdn: bool,
    bucket_ready: OnceCell<()>,
}

impl ArtifactStager {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: String,
        download_url_minutes: u32,
        download_use_cdn: bool,
    ) -> Self {
        Self {
            store,
            bucket,
            download_url_minutes,
            download_use_cdn,
            bucket_ready: OnceCell::new(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload the file at `local_path` and return its object handle.
    ///
    /// The bucket is created on first use; an existing bucket counts as
    /// success.
    pub async fn stage(
        &self,
        local_path: &Path,
        role: ArtifactRole,
    ) -> Result<ObjectHandle, StagingError> {
        self.ensure_bucket().await?;

        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|source| StagingError::Read {
                path: local_path.to_path_buf(),
                source,
            })?;

        let file_name = file_name_of(local_path);
        let key = object_key(role, &file_name, chrono::Utc::now());

        let handle = self
            .store
            .upload(&self.bucket, &key, bytes)
            .await
            .map_err(|source| StagingError::Upload {
                key: key.clone(),
                source,
            })?;

        tracing::info!(bucket = %self.bucket, key = %key, role = role.label(), "Artifact staged");
        Ok(handle)
    }

    /// Handle for an object the engine will create. No I/O.
    pub fn reserve(&self, file_name: &str, role: ArtifactRole) -> ObjectHandle {
        let key = object_key(role, file_name, chrono::Utc::now());
        self.store.handle_for(&self.bucket, &key)
    }

    /// Handle for an existing object key in the staging bucket.
    pub fn handle_for(&self, key: &str) -> ObjectHandle {
        self.store.handle_for(&self.bucket, key)
    }

    /// Ask storage for the headers `verb` needs, then build the descriptor.
    pub async fn describe(
        &self,
        handle: &ObjectHandle,
        verb: Verb,
        local_name: Option<&str>,
    ) -> Result<AccessDescriptor, StagingError> {
        let headers = self
            .store
            .access_headers(handle, verb)
            .await
            .map_err(|source| StagingError::Access {
                key: handle.key.clone(),
                source,
            })?;
        Ok(build_access_descriptor(handle, verb, headers, local_name))
    }

    /// Stage a local input file as a readable artifact.
    pub async fn stage_input(
        &self,
        name: &str,
        local_path: &Path,
    ) -> Result<Artifact, StagingError> {
        let handle = self.stage(local_path, ArtifactRole::Input).await?;
        let descriptor = self.describe(&handle, Verb::Get, None).await?;
        Ok(Artifact {
            name: name.to_string(),
            handle,
            descriptor,
            local_path: Some(local_path.to_path_buf()),
        })
    }

    /// Reserve a writable output artifact named after the input file.
    pub async fn reserve_output(
        &self,
        name: &str,
        source_file_name: &str,
    ) -> Result<Artifact, StagingError> {
        let handle = self.reserve(&format!("{source_file_name}.txt"), ArtifactRole::Output);
        let descriptor = self
            .describe(&handle, Verb::Put, Some(OUTPUT_LOCAL_NAME))
            .await?;
        Ok(Artifact {
            name: name.to_string(),
            handle,
            descriptor,
            local_path: None,
        })
    }

    /// Time-bounded URL a client can fetch `handle` from.
    pub async fn download_url(&self, handle: &ObjectHandle) -> Result<String, StoreError> {
        self.store
            .download_url(handle, self.download_url_minutes, self.download_use_cdn)
            .await
    }

    async fn ensure_bucket(&self) -> Result<(), StagingError> {
        self.bucket_ready
            .get_or_try_init(|| async {
                match self.store.create_bucket(&self.bucket).await {
                    Ok(()) => Ok(()),
                    Err(StoreError::Conflict(_)) => {
                        tracing::debug!(bucket = %self.bucket, "Bucket already exists");
                        Ok(())
                    }
                    Err(source) => Err(StagingError::BucketProvisioning {
                        bucket: self.bucket.clone(),
                        source,
                    }),
                }
            })
            .await
            .map(|_| ())
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string())
}
