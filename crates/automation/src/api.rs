//! REST client for the design-automation engine.
//!
//! [`EngineApi`] is the seam the pipeline depends on;
//! [`DesignAutomationClient`] implements it over HTTP using [`reqwest`]
//! and a shared [`TokenProvider`].

use std::sync::Arc;

use reqwest::Method;

use crate::auth::{AuthError, TokenProvider};
use crate::models::{
    ActivityRecord, ActivitySpec, Alias, AliasPatch, AliasSpec, AppBundleVersion, NewAppBundle,
    NewAppBundleVersion, Page, RawActivity, RawAppBundleVersion, RawWorkItemStatus,
    UploadParameters, WorkItemSpec, WorkItemStatusReport,
};

/// Errors from the engine API layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// No bearer token could be obtained.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The engine returned a non-2xx status code.
    #[error("Engine API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response decoded but lacked a field the pipeline needs.
    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),
}

/// Operations the pipeline needs from the remote engine.
#[async_trait::async_trait]
pub trait EngineApi: Send + Sync {
    /// One page of engine identifiers.
    async fn list_engines(&self, page: Option<&str>) -> Result<Page<String>, EngineApiError>;

    /// One page of qualified bundle identifiers (`owner.name+alias`).
    async fn list_app_bundles(&self, page: Option<&str>) -> Result<Page<String>, EngineApiError>;

    /// Create a bundle; the engine assigns version 1.
    async fn create_app_bundle(
        &self,
        spec: &NewAppBundle,
    ) -> Result<AppBundleVersion, EngineApiError>;

    /// Add a new version to an existing bundle.
    async fn create_app_bundle_version(
        &self,
        bundle: &str,
        spec: &NewAppBundleVersion,
    ) -> Result<AppBundleVersion, EngineApiError>;

    async fn create_app_bundle_alias(
        &self,
        bundle: &str,
        alias: &AliasSpec,
    ) -> Result<Alias, EngineApiError>;

    async fn modify_app_bundle_alias(
        &self,
        bundle: &str,
        alias: &str,
        patch: &AliasPatch,
    ) -> Result<Alias, EngineApiError>;

    /// Upload the package bytes to the target a new version handed out.
    async fn upload_package(
        &self,
        target: &UploadParameters,
        file_name: &str,
        package: Vec<u8>,
    ) -> Result<(), EngineApiError>;

    /// One page of qualified activity identifiers.
    async fn list_activities(&self, page: Option<&str>) -> Result<Page<String>, EngineApiError>;

    async fn create_activity(&self, spec: &ActivitySpec) -> Result<ActivityRecord, EngineApiError>;

    async fn create_activity_alias(
        &self,
        activity: &str,
        alias: &AliasSpec,
    ) -> Result<Alias, EngineApiError>;

    async fn create_work_item(
        &self,
        spec: &WorkItemSpec,
    ) -> Result<WorkItemStatusReport, EngineApiError>;

    async fn work_item_status(&self, id: &str) -> Result<WorkItemStatusReport, EngineApiError>;

    /// Download the plain-text report a work item produced.
    async fn fetch_report(&self, report_url: &str) -> Result<String, EngineApiError>;

    /// Delete every bundle, activity and alias owned by the app.
    async fn delete_app(&self) -> Result<(), EngineApiError>;
}

/// HTTP client for the design-automation v3 API.
pub struct DesignAutomationClient {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl DesignAutomationClient {
    /// * `base_url` - API root including region and version, e.g.
    ///   `https://developer.api.autodesk.com/da/us-east/v3`.
    pub fn new(client: reqwest::Client, base_url: String, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client,
            base_url,
            tokens,
        }
    }

    // ---- private helpers ----

    /// Start an authorized request against a path under the API root.
    async fn request(
        &self,
        method: Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, EngineApiError> {
        let token = self.tokens.token().await?;
        Ok(self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token))
    }

    async fn list_page(
        &self,
        path: &str,
        page: Option<&str>,
    ) -> Result<Page<String>, EngineApiError> {
        let mut request = self.request(Method::GET, path).await?;
        if let Some(token) = page {
            request = request.query(&[("page", token)]);
        }
        Self::parse_response(request.send().await?).await
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`EngineApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, EngineApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(EngineApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, EngineApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Parse a raw body and validate it into its checked form.
    async fn parse_validated<R, T>(response: reqwest::Response) -> Result<T, EngineApiError>
    where
        R: serde::de::DeserializeOwned,
        T: TryFrom<R, Error = String>,
    {
        let raw: R = Self::parse_response(response).await?;
        T::try_from(raw).map_err(EngineApiError::UnexpectedShape)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), EngineApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EngineApi for DesignAutomationClient {
    async fn list_engines(&self, page: Option<&str>) -> Result<Page<String>, EngineApiError> {
        self.list_page("/engines", page).await
    }

    async fn list_app_bundles(&self, page: Option<&str>) -> Result<Page<String>, EngineApiError> {
        self.list_page("/appbundles", page).await
    }

    async fn create_app_bundle(
        &self,
        spec: &NewAppBundle,
    ) -> Result<AppBundleVersion, EngineApiError> {
        let response = self
            .request(Method::POST, "/appbundles")
            .await?
            .json(spec)
            .send()
            .await?;
        Self::parse_validated::<RawAppBundleVersion, _>(response).await
    }

    async fn create_app_bundle_version(
        &self,
        bundle: &str,
        spec: &NewAppBundleVersion,
    ) -> Result<AppBundleVersion, EngineApiError> {
        let response = self
            .request(Method::POST, &format!("/appbundles/{bundle}/versions"))
            .await?
            .json(spec)
            .send()
            .await?;
        Self::parse_validated::<RawAppBundleVersion, _>(response).await
    }

    async fn create_app_bundle_alias(
        &self,
        bundle: &str,
        alias: &AliasSpec,
    ) -> Result<Alias, EngineApiError> {
        let response = self
            .request(Method::POST, &format!("/appbundles/{bundle}/aliases"))
            .await?
            .json(alias)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn modify_app_bundle_alias(
        &self,
        bundle: &str,
        alias: &str,
        patch: &AliasPatch,
    ) -> Result<Alias, EngineApiError> {
        let response = self
            .request(Method::PATCH, &format!("/appbundles/{bundle}/aliases/{alias}"))
            .await?
            .json(patch)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn upload_package(
        &self,
        target: &UploadParameters,
        file_name: &str,
        package: Vec<u8>,
    ) -> Result<(), EngineApiError> {
        let mut form = reqwest::multipart::Form::new();
        for (key, value) in &target.form_data {
            if let Some(value) = value {
                form = form.text(key.clone(), value.clone());
            }
        }
        let file = reqwest::multipart::Part::bytes(package).file_name(file_name.to_string());
        form = form.part("file", file);

        // The upload target is pre-signed; it must not receive our token.
        let response = self
            .client
            .post(&target.endpoint_url)
            .multipart(form)
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn list_activities(&self, page: Option<&str>) -> Result<Page<String>, EngineApiError> {
        self.list_page("/activities", page).await
    }

    async fn create_activity(&self, spec: &ActivitySpec) -> Result<ActivityRecord, EngineApiError> {
        let response = self
            .request(Method::POST, "/activities")
            .await?
            .json(spec)
            .send()
            .await?;
        Self::parse_validated::<RawActivity, _>(response).await
    }

    async fn create_activity_alias(
        &self,
        activity: &str,
        alias: &AliasSpec,
    ) -> Result<Alias, EngineApiError> {
        let response = self
            .request(Method::POST, &format!("/activities/{activity}/aliases"))
            .await?
            .json(alias)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn create_work_item(
        &self,
        spec: &WorkItemSpec,
    ) -> Result<WorkItemStatusReport, EngineApiError> {
        let response = self
            .request(Method::POST, "/workitems")
            .await?
            .json(spec)
            .send()
            .await?;
        Self::parse_validated::<RawWorkItemStatus, _>(response).await
    }

    async fn work_item_status(&self, id: &str) -> Result<WorkItemStatusReport, EngineApiError> {
        let response = self
            .request(Method::GET, &format!("/workitems/{id}"))
            .await?
            .send()
            .await?;
        Self::parse_validated::<RawWorkItemStatus, _>(response).await
    }

    async fn fetch_report(&self, report_url: &str) -> Result<String, EngineApiError> {
        // Report URLs are pre-signed storage links.
        let response = self.client.get(report_url).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.text().await?)
    }

    async fn delete_app(&self) -> Result<(), EngineApiError> {
        let response = self
            .request(Method::DELETE, "/forgeapps/me")
            .await?
            .send()
            .await?;
        Self::check_status(response).await
    }
}
