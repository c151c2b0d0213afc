use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use daflow_core::error::CoreError;
use daflow_pipeline::error::{PipelineError, ProvisioningError, StagingError, SubmissionError};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`PipelineError`] and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON error
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<ProvisioningError> for AppError {
    fn from(err: ProvisioningError) -> Self {
        Self::Pipeline(err.into())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Core(CoreError::Validation(err.to_string()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(CoreError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }

            AppError::Pipeline(err) => classify_pipeline_error(err),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map a pipeline failure onto an HTTP status, error code, and message.
///
/// - Unknown engines and malformed callbacks are the caller's fault (400).
/// - A missing bundle package maps to 404.
/// - Remote engine or storage failures map to 502.
fn classify_pipeline_error(err: &PipelineError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        PipelineError::UnsupportedEngine(_) => {
            (StatusCode::BAD_REQUEST, "UNSUPPORTED_ENGINE", message)
        }
        PipelineError::CallbackParse(_) => (StatusCode::BAD_REQUEST, "INVALID_CALLBACK", message),
        PipelineError::Provisioning(ProvisioningError::PackageMissing(_)) => {
            (StatusCode::NOT_FOUND, "PACKAGE_NOT_FOUND", message)
        }
        PipelineError::Provisioning(ProvisioningError::InvalidTemplate(_)) => {
            tracing::error!(error = %err, "Activity template rejected");
            (StatusCode::INTERNAL_SERVER_ERROR, "INVALID_TEMPLATE", message)
        }
        PipelineError::Provisioning(ProvisioningError::PackageRead { .. })
        | PipelineError::Staging(StagingError::Read { .. }) => {
            tracing::error!(error = %err, "Local file error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        PipelineError::Submission(SubmissionError::InvalidCallbackUrl(_)) => {
            tracing::error!(error = %err, "Misconfigured callback URL");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        PipelineError::Provisioning(_)
        | PipelineError::Staging(_)
        | PipelineError::Submission(_)
        | PipelineError::Polling(_) => {
            tracing::warn!(error = %err, "Upstream request failed");
            (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", message)
        }
    }
}
