//! Bundle and activity provisioning.
//!
//! [`BundleRegistry`] makes sure a named bundle exists for an engine with
//! its newest package uploaded and the configured alias pointing at it,
//! and that the activity wrapping the bundle is defined. Both operations
//! are idempotent from the caller's point of view: calling them again
//! publishes a new bundle version or leaves an existing activity alone.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use daflow_automation::api::{EngineApi, EngineApiError};
use daflow_automation::models::{
    ActivityParameter, ActivitySpec, AliasPatch, AliasSpec, AppBundleVersion, NewAppBundle,
    NewAppBundleVersion, Page, StringSetting, Verb,
};
use daflow_core::engine_kind::{EngineKind, EngineTemplate};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, ProvisioningError};
use crate::stager::OUTPUT_LOCAL_NAME;
use crate::workitem::{ARG_INPUT_FILE, ARG_OUTPUT_FILE};

/// Local name the engine gives the downloaded input.
const INPUT_LOCAL_NAME: &str = "$(inputFile)";

/// Status the engine answers when an id is already taken.
const CONFLICT: u16 = 409;

/// Marker of the engine-managed alias excluded from activity listings.
const LATEST_ALIAS_MARKER: &str = "$LATEST";

/// Bundle state as last provisioned by this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineBundle {
    pub name: String,
    pub engine: String,
    pub current_version: u32,
    pub aliases: BTreeMap<String, u32>,
}

/// Result of [`BundleRegistry::ensure_bundle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedBundle {
    /// `nickname.name+alias`.
    pub app_bundle: String,
    pub version: u32,
}

/// Result of [`BundleRegistry::ensure_activity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityOutcome {
    pub qualified_id: String,
    pub created: bool,
}

type ProvisionKey = (String, String);

/// Which paginated listing to walk.
#[derive(Debug, Clone, Copy)]
enum Listing {
    Engines,
    AppBundles,
    Activities,
}

/// Provisions bundles and activities against the engine.
pub struct BundleRegistry {
    engine: Arc<dyn EngineApi>,
    config: PipelineConfig,
    /// Serializes provisioning of the same (bundle, engine) pair.
    locks: Mutex<HashMap<ProvisionKey, Arc<Mutex<()>>>>,
    bundles: RwLock<HashMap<ProvisionKey, EngineBundle>>,
}

impl BundleRegistry {
    pub fn new(engine: Arc<dyn EngineApi>, config: PipelineConfig) -> Self {
        Self {
            engine,
            config,
            locks: Mutex::new(HashMap::new()),
            bundles: RwLock::new(HashMap::new()),
        }
    }

    /// Create the bundle (or a new version of it), upload its package and
    /// point the alias at the new version.
    ///
    /// The alias only moves after the upload succeeded. When the upload
    /// fails the freshly created version stays behind without a package
    /// and the alias keeps its previous target (or is not created at all);
    /// the next call adds another version and creates the alias then.
    pub async fn ensure_bundle(
        &self,
        name: &str,
        engine: &str,
        package_path: &Path,
    ) -> Result<ProvisionedBundle, ProvisioningError> {
        if !tokio::fs::try_exists(package_path).await.unwrap_or(false) {
            return Err(ProvisioningError::PackageMissing(package_path.to_path_buf()));
        }

        let key = (name.to_string(), engine.to_string());
        let lock = self.provision_lock(&key).await;
        let _guard = lock.lock().await;

        let qualified_id = self.config.qualified_id(name);
        let existing = self.list_all(Listing::AppBundles).await?;
        // Any alias (including `$LATEST`) proves the bundle exists, even when
        // an earlier upload failed before our alias was created.
        let bundle_prefix = format!("{}.{}+", self.config.nickname, name);
        let bundle_exists = existing.iter().any(|id| id.starts_with(&bundle_prefix));
        let alias_exists = existing.iter().any(|id| *id == qualified_id);

        let package = tokio::fs::read(package_path)
            .await
            .map_err(|source| ProvisioningError::PackageRead {
                path: package_path.to_path_buf(),
                source,
            })?;

        let created: AppBundleVersion = if bundle_exists {
            self.create_version(name, engine).await?
        } else {
            match self
                .engine
                .create_app_bundle(&NewAppBundle {
                    id: name.to_string(),
                    engine: engine.to_string(),
                    description: format!("Description for {name}"),
                })
                .await
            {
                Ok(created) => created,
                Err(EngineApiError::ApiError { status: CONFLICT, .. }) => {
                    tracing::warn!(bundle = %name, "Bundle exists but was not listed, adding a version");
                    self.create_version(name, engine).await?
                }
                Err(err) => return Err(err.into()),
            }
        };
        let version = created.version;
        tracing::info!(bundle = %name, engine = %engine, version, "Bundle version created");

        let file_name = package_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{name}.zip"));
        if let Err(source) = self
            .engine
            .upload_package(&created.upload_parameters, &file_name, package)
            .await
        {
            tracing::error!(
                bundle = %name,
                version,
                error = %source,
                "Package upload failed, version left without package"
            );
            return Err(ProvisioningError::PackageUpload {
                bundle: name.to_string(),
                version,
                source,
            });
        }

        let alias = &self.config.alias;
        let patch = AliasPatch { version };
        if alias_exists {
            self.engine.modify_app_bundle_alias(name, alias, &patch).await?;
        } else {
            let spec = AliasSpec {
                id: alias.clone(),
                version,
            };
            match self.engine.create_app_bundle_alias(name, &spec).await {
                Ok(_) => {}
                Err(EngineApiError::ApiError { status: CONFLICT, .. }) => {
                    self.engine.modify_app_bundle_alias(name, alias, &patch).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        tracing::info!(bundle = %name, alias = %alias, version, "Bundle alias updated");

        self.record(key, alias, version).await;

        Ok(ProvisionedBundle {
            app_bundle: qualified_id,
            version,
        })
    }

    /// Define the activity wrapping `bundle_name` unless it already exists.
    pub async fn ensure_activity(
        &self,
        name: &str,
        engine: &str,
        bundle_name: &str,
    ) -> Result<ActivityOutcome, PipelineError> {
        let template = EngineKind::resolve(engine)?;
        let spec = self.activity_spec(name, engine, bundle_name, template);
        validate_template(&spec)?;

        let qualified_id = self.config.qualified_id(name);
        let existing = self.list_all(Listing::Activities).await.map_err(ProvisioningError::from)?;
        if existing.iter().any(|id| *id == qualified_id) {
            tracing::debug!(activity = %qualified_id, "Activity already defined");
            return Ok(ActivityOutcome {
                qualified_id,
                created: false,
            });
        }

        let record = self
            .engine
            .create_activity(&spec)
            .await
            .map_err(ProvisioningError::from)?;
        self.engine
            .create_activity_alias(
                name,
                &AliasSpec {
                    id: self.config.alias.clone(),
                    version: 1,
                },
            )
            .await
            .map_err(ProvisioningError::from)?;
        tracing::info!(activity = %qualified_id, version = record.version, "Activity created");

        Ok(ActivityOutcome {
            qualified_id,
            created: true,
        })
    }

    /// Every engine id the service offers, sorted.
    pub async fn available_engines(&self) -> Result<Vec<String>, ProvisioningError> {
        let mut engines = self.list_all(Listing::Engines).await?;
        engines.sort();
        Ok(engines)
    }

    /// Activities owned by this app, without the nickname prefix.
    pub async fn defined_activities(&self) -> Result<Vec<String>, ProvisioningError> {
        let prefix = format!("{}.", self.config.nickname);
        Ok(self
            .list_all(Listing::Activities)
            .await?
            .into_iter()
            .filter(|id| !id.contains(LATEST_ALIAS_MARKER))
            .filter_map(|id| id.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Delete everything the app owns on the engine side.
    pub async fn clear_account(&self) -> Result<(), ProvisioningError> {
        self.engine.delete_app().await?;
        self.bundles.write().await.clear();
        tracing::warn!(nickname = %self.config.nickname, "Engine account cleared");
        Ok(())
    }

    /// Last provisioned state of a bundle, if this process provisioned it.
    pub async fn bundle(&self, name: &str, engine: &str) -> Option<EngineBundle> {
        self.bundles
            .read()
            .await
            .get(&(name.to_string(), engine.to_string()))
            .cloned()
    }

    // ---- private helpers ----

    async fn create_version(
        &self,
        name: &str,
        engine: &str,
    ) -> Result<AppBundleVersion, EngineApiError> {
        self.engine
            .create_app_bundle_version(
                name,
                &NewAppBundleVersion {
                    engine: engine.to_string(),
                    description: name.to_string(),
                },
            )
            .await
    }

    async fn provision_lock(&self, key: &ProvisionKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    async fn record(&self, key: ProvisionKey, alias: &str, version: u32) {
        let mut bundles = self.bundles.write().await;
        let entry = bundles.entry(key.clone()).or_insert_with(|| EngineBundle {
            name: key.0.clone(),
            engine: key.1.clone(),
            current_version: version,
            aliases: BTreeMap::new(),
        });
        entry.current_version = entry.current_version.max(version);
        entry.aliases.insert(alias.to_string(), version);
    }

    fn activity_spec(
        &self,
        name: &str,
        engine: &str,
        bundle_name: &str,
        template: &EngineTemplate,
    ) -> ActivitySpec {
        let parameters = BTreeMap::from([
            (
                ARG_INPUT_FILE.to_string(),
                ActivityParameter {
                    verb: Verb::Get,
                    description: "input file".to_string(),
                    local_name: INPUT_LOCAL_NAME.to_string(),
                    ondemand: false,
                    required: true,
                    zip: false,
                },
            ),
            (
                ARG_OUTPUT_FILE.to_string(),
                ActivityParameter {
                    verb: Verb::Put,
                    description: "output file".to_string(),
                    local_name: OUTPUT_LOCAL_NAME.to_string(),
                    ondemand: false,
                    required: true,
                    zip: false,
                },
            ),
        ]);
        let settings = BTreeMap::from([(
            "script".to_string(),
            StringSetting {
                value: template.script.to_string(),
            },
        )]);

        ActivitySpec {
            id: name.to_string(),
            engine: engine.to_string(),
            command_line: vec![template.command_line_for(bundle_name)],
            appbundles: vec![self.config.qualified_id(bundle_name)],
            parameters,
            settings,
            description: format!("{name} on {engine}"),
        }
    }

    /// Walk every page of a listing.
    async fn list_all(&self, listing: Listing) -> Result<Vec<String>, EngineApiError> {
        let mut all = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page: Page<String> = match listing {
                Listing::Engines => self.engine.list_engines(token.as_deref()).await?,
                Listing::AppBundles => self.engine.list_app_bundles(token.as_deref()).await?,
                Listing::Activities => self.engine.list_activities(token.as_deref()).await?,
            };
            all.extend(page.data);
            match page.pagination_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        Ok(all)
    }
}

/// Names referenced as `$(args[NAME]...` in a command line.
pub fn referenced_arguments(command_line: &str) -> Vec<&str> {
    const OPEN: &str = "$(args[";
    let mut names = Vec::new();
    let mut rest = command_line;
    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        match after.find(']') {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end..];
            }
            None => break,
        }
    }
    names
}

/// Every argument the command line references must be declared.
fn validate_template(spec: &ActivitySpec) -> Result<(), ProvisioningError> {
    for line in &spec.command_line {
        for arg in referenced_arguments(line) {
            if !spec.parameters.contains_key(arg) {
                return Err(ProvisioningError::InvalidTemplate(format!(
                    "command line references undeclared argument '{arg}'"
                )));
            }
        }
    }
    Ok(())
}
