//! Handlers for bundle packages and their provisioning.

use std::path::Path;

use axum::extract::State;
use axum::Json;
use daflow_pipeline::registry::ProvisionedBundle;
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Extension of bundle packages in the bundles directory.
const PACKAGE_EXTENSION: &str = "zip";

/// Suffix turning a package name into its bundle name.
pub const BUNDLE_SUFFIX: &str = "AppBundle";

/// Body shared by bundle and activity provisioning.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    /// Package name without the `.zip` extension.
    #[validate(length(min = 1, max = 128))]
    pub zip_file_name: String,
    #[validate(length(min = 1, max = 128))]
    pub engine: String,
}

impl ProvisionRequest {
    /// Validate fields and reject names that could escape the bundles dir.
    pub fn checked(&self) -> AppResult<()> {
        self.validate()?;
        if self.zip_file_name.contains(['/', '\\']) || self.zip_file_name.starts_with('.') {
            return Err(AppError::BadRequest(format!(
                "Invalid package name '{}'",
                self.zip_file_name
            )));
        }
        Ok(())
    }

    pub fn bundle_name(&self) -> String {
        format!("{}{BUNDLE_SUFFIX}", self.zip_file_name)
    }
}

/// GET /api/appbundles
///
/// Names (without extension) of the packages available locally.
pub async fn list_local_bundles(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<String>>>> {
    let names = local_package_names(&state.bundles_dir).await?;
    Ok(Json(DataResponse { data: names }))
}

/// POST /api/aps/designautomation/appbundles
///
/// Publish the local package as a new bundle version.
pub async fn create_app_bundle(
    State(state): State<AppState>,
    Json(input): Json<ProvisionRequest>,
) -> AppResult<Json<DataResponse<ProvisionedBundle>>> {
    input.checked()?;
    let package = state
        .bundles_dir
        .join(format!("{}.{PACKAGE_EXTENSION}", input.zip_file_name));

    let provisioned = state
        .registry
        .ensure_bundle(&input.bundle_name(), &input.engine, &package)
        .await?;

    Ok(Json(DataResponse { data: provisioned }))
}

/// Sorted stems of the `*.zip` files in `dir`. A missing directory is empty.
pub async fn local_package_names(dir: &Path) -> AppResult<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(dir = %dir.display(), "Bundles directory does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(AppError::InternalError(format!("Failed to read bundles dir: {e}"))),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(PACKAGE_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_name_has_suffix() {
        let req = ProvisionRequest {
            zip_file_name: "GetXrefDetails".into(),
            engine: "Autodesk.AutoCAD+24_1".into(),
        };
        assert_eq!(req.bundle_name(), "GetXrefDetailsAppBundle");
        assert!(req.checked().is_ok());
    }

    #[test]
    fn path_like_names_are_rejected() {
        let req = ProvisionRequest {
            zip_file_name: "../secret".into(),
            engine: "Autodesk.AutoCAD+24_1".into(),
        };
        assert!(matches!(req.checked(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn empty_engine_fails_validation() {
        let req = ProvisionRequest {
            zip_file_name: "X".into(),
            engine: String::new(),
        };
        assert!(matches!(req.checked(), Err(AppError::Core(_))));
    }

    #[tokio::test]
    async fn only_zip_packages_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.zip"), b"").unwrap();
        std::fs::write(dir.path().join("a.zip"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let names = local_package_names(dir.path()).await.unwrap();
        assert_eq!(names, vec!["a", "b"]);
    }
}
