//! Manifest source reading JSON documents from a directory tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tidegate_application::{DeclaredSource, ManifestSource, RevisionCache};
use tidegate_core::{AppError, AppResult};
use tidegate_domain::{
    DeclaredSnapshot, ImageReplacement, RemoteSecretReference, ResourceKind,
    ResourceSpecification, ResourceSpecificationInput,
};
use tracing::info;
use walkdir::{DirEntry, WalkDir};

mod git;

/// Manifest API version accepted by the source.
pub const MANIFEST_API_VERSION: &str = "tidegate.io/v1";

const APP_MANIFEST_KIND: &str = "ContainerApp";
const JOB_MANIFEST_KIND: &str = "ContainerJob";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ManifestDocument {
    kind: String,
    api_version: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    spec: Option<ManifestSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ManifestSpec {
    resource: Option<Value>,
    #[serde(default)]
    remote_secrets: Vec<RemoteSecretReference>,
    #[serde(default)]
    location_filter: Vec<String>,
    #[serde(default)]
    replacements: Option<ManifestReplacements>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestReplacements {
    #[serde(default)]
    images: Vec<ImageReplacement>,
}

/// Manifest source over every `*.json` file below a directory.
///
/// Each file holds one manifest document or an array of them. The revision is
/// the enclosing git checkout's HEAD commit when there is one, otherwise a
/// SHA-256 over the sorted file paths and contents.
pub struct JsonDirectoryManifestSource {
    root: PathBuf,
    location: String,
    environment_id: String,
    revision_cache: Option<Arc<dyn RevisionCache>>,
}

impl JsonDirectoryManifestSource {
    /// Creates a source reading below `root`, injecting the location and environment id.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        location: impl Into<String>,
        environment_id: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            location: location.into(),
            environment_id: environment_id.into(),
            revision_cache: None,
        }
    }

    /// Adds revision change tracking.
    #[must_use]
    pub fn with_revision_cache(mut self, revision_cache: Arc<dyn RevisionCache>) -> Self {
        self.revision_cache = Some(revision_cache);
        self
    }

    async fn track_revision(&self, revision: &str) -> AppResult<()> {
        let Some(cache) = &self.revision_cache else {
            return Ok(());
        };

        let previous = cache.get().await?;
        if previous.as_deref() != Some(revision) {
            info!(
                revision,
                previous = previous.as_deref().unwrap_or("none"),
                "new manifest revision observed"
            );
            cache.set(revision).await?;
        }

        Ok(())
    }

    fn parse_files(&self, files: &BTreeMap<String, String>) -> DeclaredSnapshot {
        let mut snapshot = DeclaredSnapshot::default();

        for (path, content) in files {
            let documents = match serde_json::from_str::<Value>(content) {
                Ok(Value::Array(documents)) => documents,
                Ok(document) => vec![document],
                Err(error) => {
                    snapshot.apps.insert_error(
                        format!("{path}-0"),
                        format!("unable to parse {path}: {error}"),
                    );
                    continue;
                }
            };

            for (index, document) in documents.into_iter().enumerate() {
                self.add_document(&mut snapshot, path, index, document);
            }
        }

        snapshot
    }

    fn add_document(
        &self,
        snapshot: &mut DeclaredSnapshot,
        path: &str,
        index: usize,
        document: Value,
    ) {
        let kind = match document.get("kind").and_then(Value::as_str) {
            Some(JOB_MANIFEST_KIND) => ResourceKind::Job,
            _ => ResourceKind::App,
        };

        let specification = match self.parse_document(document) {
            Ok(specification) => specification,
            Err(error) => {
                snapshot.state_mut(kind).insert_error(
                    format!("{path}-{index}"),
                    format!("unable to parse {path} (document {index}): {error}"),
                );
                return;
            }
        };

        let name = specification.name().to_owned();
        if snapshot.state(kind).get(name.as_str()).is_some() {
            snapshot.state_mut(kind).insert_error(
                format!("{path}-{index}-{name}"),
                format!(
                    "unable to add {path} (document {index}) with name {name} as name is a duplicate"
                ),
            );
            return;
        }

        if let Err(error) = snapshot.insert(specification) {
            snapshot.state_mut(kind).insert_error(
                format!("{path}-{index}-{name}"),
                format!("unable to add {path} (document {index}): {error}"),
            );
        }
    }

    fn parse_document(&self, document: Value) -> AppResult<ResourceSpecification> {
        let document: ManifestDocument = serde_json::from_value(document)
            .map_err(|error| AppError::Validation(error.to_string()))?;

        let kind = match document.kind.as_str() {
            APP_MANIFEST_KIND => ResourceKind::App,
            JOB_MANIFEST_KIND => ResourceKind::Job,
            other => {
                return Err(AppError::Validation(format!(
                    "kind should be {APP_MANIFEST_KIND} or {JOB_MANIFEST_KIND}, got \"{other}\""
                )));
            }
        };
        if document.api_version != MANIFEST_API_VERSION {
            return Err(AppError::Validation(format!(
                "apiVersion for {} should be {MANIFEST_API_VERSION}",
                document.kind
            )));
        }

        let spec = document
            .spec
            .ok_or_else(|| AppError::Validation("spec is missing".to_owned()))?;
        let mut payload = spec
            .resource
            .ok_or_else(|| AppError::Validation("resource is missing".to_owned()))?;
        self.inject_platform_fields(kind, &mut payload)?;

        ResourceSpecification::new(ResourceSpecificationInput {
            kind,
            api_version: document.api_version,
            metadata: document.metadata,
            payload,
            remote_secrets: spec.remote_secrets,
            location_filter: spec.location_filter,
            image_replacements: spec.replacements.unwrap_or_default().images,
        })
    }

    fn inject_platform_fields(&self, kind: ResourceKind, payload: &mut Value) -> AppResult<()> {
        let environment_field = match kind {
            ResourceKind::App => "managedEnvironmentId",
            ResourceKind::Job => "environmentId",
        };

        let Some(resource) = payload.as_object_mut() else {
            return Err(AppError::Validation(
                "resource must be an object".to_owned(),
            ));
        };
        if resource.contains_key("location") {
            return Err(AppError::Validation(
                "location is disabled and set through tidegate".to_owned(),
            ));
        }
        resource.insert("location".to_owned(), Value::String(self.location.clone()));

        let preset = resource
            .get("properties")
            .and_then(|properties| properties.get(environment_field))
            .is_some();
        if preset {
            return Err(AppError::Validation(format!(
                "{environment_field} is disabled and set through tidegate"
            )));
        }
        if self.environment_id.is_empty() {
            return Ok(());
        }

        let properties = resource
            .entry("properties")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        let Some(properties) = properties.as_object_mut() else {
            return Err(AppError::Validation(
                "resource properties must be an object".to_owned(),
            ));
        };
        properties.insert(
            environment_field.to_owned(),
            Value::String(self.environment_id.clone()),
        );

        Ok(())
    }
}

#[async_trait]
impl ManifestSource for JsonDirectoryManifestSource {
    async fn fetch(&self) -> AppResult<DeclaredSource> {
        let root = self.root.clone();
        let (files, head) = tokio::task::spawn_blocking(move || {
            let files = read_manifest_files(&root)?;
            let head = git::head_revision(&root);
            Ok::<_, AppError>((files, head))
        })
        .await
        .map_err(|error| AppError::Internal(format!("manifest read task failed: {error}")))??;

        let revision = head.unwrap_or_else(|| content_revision(&files));
        self.track_revision(revision.as_str()).await?;

        Ok(DeclaredSource {
            snapshot: self.parse_files(&files),
            revision,
        })
    }
}

fn read_manifest_files(root: &Path) -> AppResult<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = entry.map_err(|error| {
            AppError::Internal(format!(
                "failed to read manifest directory '{}': {error}",
                root.display()
            ))
        })?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            continue;
        }
        if path.extension().and_then(|extension| extension.to_str()) != Some("json") {
            continue;
        }
        // symlinked directories are never descended, symlinked files are read
        if entry.path_is_symlink() && !path.is_file() {
            continue;
        }

        let content = std::fs::read_to_string(path).map_err(|error| {
            AppError::Internal(format!(
                "failed to read manifest '{}': {error}",
                path.display()
            ))
        })?;
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        files.insert(relative, content);
    }

    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn content_revision(files: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (path, content) in files {
        hasher.update(path.as_bytes());
        hasher.update([0_u8]);
        hasher.update(content.as_bytes());
        hasher.update([0_u8]);
    }

    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
