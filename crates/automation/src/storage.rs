//! Object storage client.
//!
//! [`ObjectStore`] covers what the stager needs: bucket creation,
//! uploads, per-verb access headers and signed download URLs.
//! [`OssClient`] implements it against the object storage service that
//! backs the engine, using the direct-to-S3 signed upload flow.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, TokenProvider};
use crate::models::Verb;

/// Prefix of storage object identifiers the engine can fetch directly.
const OBJECT_URN_PREFIX: &str = "urn:adsk.objects:os.object:";

/// Durable reference to a stored (or reserved) object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle {
    pub bucket: String,
    pub key: String,
    /// Identifier the remote engine resolves to the object's bytes.
    pub location: String,
}

/// Errors from the object storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The resource already exists (HTTP 409).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage returned a non-2xx status code.
    #[error("Storage API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// The response lacked a field the stager needs.
    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),

    /// The object key could not be turned into a request URL.
    #[error("Invalid object path: {0}")]
    InvalidPath(String),
}

/// Operations the artifact stager needs from blob storage.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create a bucket. An existing bucket yields [`StoreError::Conflict`].
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    /// Upload bytes and return the handle of the stored object.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<ObjectHandle, StoreError>;

    /// Handle for an object that does not exist yet (an output target).
    fn handle_for(&self, bucket: &str, key: &str) -> ObjectHandle;

    /// Headers the engine must send to access `handle` with `verb`.
    async fn access_headers(
        &self,
        handle: &ObjectHandle,
        verb: Verb,
    ) -> Result<BTreeMap<String, String>, StoreError>;

    /// Time-bounded URL a client can download the object from.
    async fn download_url(
        &self,
        handle: &ObjectHandle,
        minutes_expiration: u32,
        use_cdn: bool,
    ) -> Result<String, StoreError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBucketBody<'a> {
    bucket_key: &'a str,
    policy_key: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedUpload {
    upload_key: String,
    #[serde(default)]
    urls: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteUploadBody<'a> {
    upload_key: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletedUpload {
    object_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignedDownload {
    url: Option<String>,
}

/// HTTP client for the object storage service.
pub struct OssClient {
    client: reqwest::Client,
    base_url: String,
    region: String,
    tokens: Arc<dyn TokenProvider>,
}

impl OssClient {
    /// * `base_url` - storage API root, e.g. `https://developer.api.autodesk.com/oss/v2`.
    /// * `region`   - storage region for new buckets, e.g. `US`.
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        region: String,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            client,
            base_url,
            region,
            tokens,
        }
    }

    /// Build `{base}/buckets/{bucket}/objects/{key}/{suffix}` with every
    /// segment percent-encoded.
    fn object_url(&self, bucket: &str, key: &str, suffix: &str) -> Result<reqwest::Url, StoreError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| StoreError::InvalidPath(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidPath(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["buckets", bucket, "objects", key, suffix]);
        Ok(url)
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        if status == reqwest::StatusCode::CONFLICT {
            return Err(StoreError::Conflict(body));
        }
        Err(StoreError::ApiError {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait::async_trait]
impl ObjectStore for OssClient {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let token = self.tokens.token().await?;
        let response = self
            .client
            .post(format!("{}/buckets", self.base_url))
            .bearer_auth(token)
            .header("x-ads-region", &self.region)
            .json(&CreateBucketBody {
                bucket_key: bucket,
                policy_key: "transient",
            })
            .send()
            .await?;
        Self::ensure_success(response).await?;
        tracing::info!(bucket, "Bucket created");
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<ObjectHandle, StoreError> {
        let token = self.tokens.token().await?;
        let signed_url = self.object_url(bucket, key, "signeds3upload")?;

        // 1. Ask for a pre-signed upload URL.
        let response = self
            .client
            .get(signed_url.clone())
            .bearer_auth(&token)
            .send()
            .await?;
        let signed: SignedUpload = Self::ensure_success(response).await?.json().await?;
        let target = signed
            .urls
            .first()
            .ok_or_else(|| StoreError::UnexpectedShape("signed upload has no URL".into()))?;

        // 2. Send the bytes straight to the signed URL.
        let size = bytes.len();
        let response = self.client.put(target).body(bytes).send().await?;
        Self::ensure_success(response).await?;

        // 3. Finalize so the object becomes visible.
        let response = self
            .client
            .post(signed_url)
            .bearer_auth(&token)
            .json(&CompleteUploadBody {
                upload_key: &signed.upload_key,
            })
            .send()
            .await?;
        let completed: CompletedUpload = Self::ensure_success(response).await?.json().await?;
        let location = completed
            .object_id
            .ok_or_else(|| StoreError::UnexpectedShape("completed upload has no objectId".into()))?;

        tracing::debug!(bucket, key, size, "Object uploaded");

        Ok(ObjectHandle {
            bucket: bucket.to_string(),
            key: key.to_string(),
            location,
        })
    }

    fn handle_for(&self, bucket: &str, key: &str) -> ObjectHandle {
        ObjectHandle {
            bucket: bucket.to_string(),
            key: key.to_string(),
            location: format!("{OBJECT_URN_PREFIX}{bucket}/{key}"),
        }
    }

    async fn access_headers(
        &self,
        _handle: &ObjectHandle,
        _verb: Verb,
    ) -> Result<BTreeMap<String, String>, StoreError> {
        let token = self.tokens.token().await?;
        Ok(BTreeMap::from([(
            "Authorization".to_string(),
            format!("Bearer {token}"),
        )]))
    }

    async fn download_url(
        &self,
        handle: &ObjectHandle,
        minutes_expiration: u32,
        use_cdn: bool,
    ) -> Result<String, StoreError> {
        let token = self.tokens.token().await?;
        let url = self.object_url(&handle.bucket, &handle.key, "signeds3download")?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&[
                ("minutesExpiration", minutes_expiration.to_string()),
                ("useCdn", use_cdn.to_string()),
            ])
            .send()
            .await?;
        let signed: SignedDownload = Self::ensure_success(response).await?.json().await?;
        signed
            .url
            .ok_or_else(|| StoreError::UnexpectedShape("signed download has no url".into()))
    }
}
