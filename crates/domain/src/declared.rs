use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tidegate_core::{AppError, AppResult, ErrorList, NonEmptyString};

use crate::resource::{MANAGED_TAG_KEY, REGISTRY_SECRET_NAME, ResourceKind, sanitize_location};

/// Reference from a local secret name to a value held in the external secret store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSecretReference {
    /// Secret name inside the resource payload.
    #[serde(default)]
    pub secret_name: String,
    /// Secret name inside the external store.
    #[serde(default)]
    pub remote_secret_name: String,
}

impl RemoteSecretReference {
    /// Creates a secret reference.
    #[must_use]
    pub fn new(secret_name: impl Into<String>, remote_secret_name: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
            remote_secret_name: remote_secret_name.into(),
        }
    }

    /// Returns true when both names are set.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.secret_name.is_empty() && !self.remote_secret_name.is_empty()
    }
}

/// Image tag override applied to matching containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReplacement {
    /// Image name without tag, compared against each container image.
    pub image_name: String,
    /// Tag written in place of the current one.
    pub new_image_tag: String,
}

impl ImageReplacement {
    /// Creates an image replacement.
    #[must_use]
    pub fn new(image_name: impl Into<String>, new_image_tag: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            new_image_tag: new_image_tag.into(),
        }
    }
}

/// Input payload for a declared resource specification.
#[derive(Debug, Clone)]
pub struct ResourceSpecificationInput {
    /// Workload kind.
    pub kind: ResourceKind,
    /// Manifest API version.
    pub api_version: String,
    /// Manifest metadata, must contain `name`.
    pub metadata: BTreeMap<String, String>,
    /// Opaque resource payload sent to the remote platform.
    pub payload: Value,
    /// External secret references injected before apply.
    pub remote_secrets: Vec<RemoteSecretReference>,
    /// Regions this resource is allowed to run in; empty means everywhere.
    pub location_filter: Vec<String>,
    /// Image tag overrides.
    pub image_replacements: Vec<ImageReplacement>,
}

/// Validated desired state for one named app or job.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpecification {
    kind: ResourceKind,
    api_version: String,
    name: NonEmptyString,
    metadata: BTreeMap<String, String>,
    payload: Value,
    remote_secrets: Vec<RemoteSecretReference>,
    location_filter: Vec<String>,
    image_replacements: Vec<ImageReplacement>,
}

impl ResourceSpecification {
    /// Creates a validated specification.
    ///
    /// The payload is tagged as managed, location filters are sanitized and
    /// image replacements are applied to the payload containers.
    pub fn new(input: ResourceSpecificationInput) -> AppResult<Self> {
        let name = input
            .metadata
            .get("name")
            .cloned()
            .ok_or_else(|| AppError::Validation("name missing from metadata".to_owned()))
            .and_then(NonEmptyString::new)?;

        if !input.payload.is_object() {
            return Err(AppError::Validation(format!(
                "{} '{}' payload must be an object",
                input.kind,
                name.as_str()
            )));
        }

        for replacement in &input.image_replacements {
            if replacement.image_name.trim().is_empty() || replacement.new_image_tag.trim().is_empty()
            {
                return Err(AppError::Validation(format!(
                    "image replacement for '{}' requires imageName and newImageTag",
                    name.as_str()
                )));
            }
        }

        let mut specification = Self {
            kind: input.kind,
            api_version: input.api_version,
            name,
            metadata: input.metadata,
            payload: input.payload,
            remote_secrets: input.remote_secrets,
            location_filter: input
                .location_filter
                .iter()
                .map(|location| sanitize_location(location))
                .collect(),
            image_replacements: input.image_replacements,
        };

        specification.tag_as_managed()?;
        specification.apply_image_replacements()?;

        Ok(specification)
    }

    /// Returns the workload kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns the manifest API version.
    #[must_use]
    pub fn api_version(&self) -> &str {
        self.api_version.as_str()
    }

    /// Returns the unique resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns manifest metadata.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Returns the resource payload sent to the remote platform.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the valid remote secret references, skipping incomplete ones.
    pub fn remote_secrets(&self) -> impl Iterator<Item = &RemoteSecretReference> {
        self.remote_secrets
            .iter()
            .filter(|reference| reference.is_valid())
    }

    /// Returns sanitized location filters.
    #[must_use]
    pub fn location_filter(&self) -> &[String] {
        self.location_filter.as_slice()
    }

    /// Returns declared image replacements.
    #[must_use]
    pub fn image_replacements(&self) -> &[ImageReplacement] {
        self.image_replacements.as_slice()
    }

    /// Returns true when the resource may run in `current_location`.
    #[must_use]
    pub fn should_run_in_location(&self, current_location: &str) -> bool {
        if self.location_filter.is_empty() {
            return true;
        }

        let current_location = sanitize_location(current_location);
        self.location_filter
            .iter()
            .any(|location| *location == current_location)
    }

    /// Appends one literal secret to the payload configuration.
    pub fn set_secret(&mut self, secret_name: &str, value: &str) -> AppResult<()> {
        let secrets = configuration_array_mut(&mut self.payload, "secrets")?;
        let exists = secrets
            .iter()
            .any(|secret| secret.get("name").and_then(Value::as_str) == Some(secret_name));
        if exists {
            return Err(AppError::Conflict(format!(
                "a secret with name \"{secret_name}\" already exists"
            )));
        }

        secrets.push(serde_json::json!({
            "name": secret_name,
            "value": value,
        }));

        Ok(())
    }

    /// Appends registry credentials backed by the shared registry secret.
    pub fn set_registry(&mut self, server: &str, username: &str, password: &str) -> AppResult<()> {
        let registries = configuration_array_mut(&mut self.payload, "registries")?;
        let exists = registries.iter().any(|registry| {
            let has_credentials = registry.get("username").is_some()
                && (registry.get("identity").is_some()
                    || registry.get("passwordSecretRef").is_some());
            has_credentials && registry.get("server").and_then(Value::as_str) == Some(server)
        });
        if exists {
            return Err(AppError::Conflict(format!(
                "the server \"{server}\" already exists"
            )));
        }

        self.set_secret(REGISTRY_SECRET_NAME, password)?;

        configuration_array_mut(&mut self.payload, "registries")?.push(serde_json::json!({
            "server": server,
            "username": username,
            "passwordSecretRef": REGISTRY_SECRET_NAME,
        }));

        Ok(())
    }

    fn tag_as_managed(&mut self) -> AppResult<()> {
        let root = object_mut(&mut self.payload, "payload")?;
        let tags = object_field_mut(root, "tags")?;
        tags.insert(MANAGED_TAG_KEY.to_owned(), Value::String("true".to_owned()));
        Ok(())
    }

    fn apply_image_replacements(&mut self) -> AppResult<()> {
        if self.image_replacements.is_empty() {
            return Ok(());
        }

        let containers = self
            .payload
            .pointer_mut("/properties/template/containers")
            .and_then(Value::as_array_mut)
            .filter(|containers| !containers.is_empty())
            .ok_or_else(|| AppError::Validation("no containers found".to_owned()))?;

        for (index, container) in containers.iter_mut().enumerate() {
            let image = container
                .get("image")
                .and_then(Value::as_str)
                .filter(|image| !image.is_empty())
                .ok_or_else(|| {
                    AppError::Validation(format!("no image found for container {index}"))
                })?;
            let image_name = image.split(':').next().unwrap_or(image).to_owned();

            let replacement = self
                .image_replacements
                .iter()
                .rev()
                .find(|replacement| replacement.image_name == image_name);
            if let (Some(replacement), Some(container)) = (replacement, container.as_object_mut())
            {
                container.insert(
                    "image".to_owned(),
                    Value::String(format!("{image_name}:{}", replacement.new_image_tag)),
                );
            }
        }

        Ok(())
    }
}

fn object_mut<'a>(value: &'a mut Value, field: &str) -> AppResult<&'a mut Map<String, Value>> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }

    value
        .as_object_mut()
        .ok_or_else(|| AppError::Validation(format!("{field} must be an object")))
}

fn object_field_mut<'a>(
    parent: &'a mut Map<String, Value>,
    field: &str,
) -> AppResult<&'a mut Map<String, Value>> {
    let value = parent
        .entry(field.to_owned())
        .or_insert_with(|| Value::Object(Map::new()));
    object_mut(value, field)
}

fn configuration_array_mut<'a>(payload: &'a mut Value, field: &str) -> AppResult<&'a mut Vec<Value>> {
    let root = object_mut(payload, "payload")?;
    let properties = object_field_mut(root, "properties")?;
    let configuration = object_field_mut(properties, "configuration")?;
    let values = configuration
        .entry(field.to_owned())
        .or_insert_with(|| Value::Array(Vec::new()));
    if values.is_null() {
        *values = Value::Array(Vec::new());
    }

    values
        .as_array_mut()
        .ok_or_else(|| AppError::Validation(format!("configuration.{field} must be an array")))
}

/// One declared entry: a valid specification or the reason it could not be built.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredEntry {
    /// Parsed and validated specification.
    Valid(ResourceSpecification),
    /// Parse or validation failure, excluded from reconciliation.
    Invalid(String),
}

/// Declared specifications of one kind, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclaredState {
    entries: BTreeMap<String, DeclaredEntry>,
}

impl DeclaredState {
    /// Creates an empty declared state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a valid specification, rejecting duplicate names.
    pub fn insert(&mut self, specification: ResourceSpecification) -> AppResult<()> {
        let name = specification.name().to_owned();
        if self.entries.contains_key(name.as_str()) {
            return Err(AppError::Conflict(format!(
                "{} '{name}' is declared more than once",
                specification.kind()
            )));
        }

        self.entries
            .insert(name, DeclaredEntry::Valid(specification));
        Ok(())
    }

    /// Records an entry that failed to parse or validate under `key`.
    pub fn insert_error(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.entries
            .insert(key.into(), DeclaredEntry::Invalid(message.into()));
    }

    /// Returns a valid specification by name; errored entries are never returned.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceSpecification> {
        match self.entries.get(name) {
            Some(DeclaredEntry::Valid(specification)) => Some(specification),
            _ => None,
        }
    }

    /// Returns valid specifications in name order.
    pub fn specifications(&self) -> impl Iterator<Item = &ResourceSpecification> {
        self.entries.values().filter_map(|entry| match entry {
            DeclaredEntry::Valid(specification) => Some(specification),
            DeclaredEntry::Invalid(_) => None,
        })
    }

    /// Returns valid specification names in sorted order.
    #[must_use]
    pub fn sorted_names(&self) -> Vec<String> {
        self.specifications()
            .map(|specification| specification.name().to_owned())
            .collect()
    }

    /// Returns the number of entries, errored ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Combines every per-entry error into one, or `None` when all entries are valid.
    #[must_use]
    pub fn error(&self) -> Option<AppError> {
        let mut errors = ErrorList::new();
        for entry in self.entries.values() {
            if let DeclaredEntry::Invalid(message) = entry {
                errors.push(AppError::Validation(message.clone()));
            }
        }

        errors.into_error()
    }

    /// Injects a literal secret into the named specification.
    pub fn set_secret(&mut self, name: &str, secret_name: &str, value: &str) -> AppResult<()> {
        self.valid_mut(name)?.set_secret(secret_name, value)
    }

    /// Injects registry credentials into the named specification.
    pub fn set_registry(
        &mut self,
        name: &str,
        server: &str,
        username: &str,
        password: &str,
    ) -> AppResult<()> {
        self.valid_mut(name)?
            .set_registry(server, username, password)
    }

    /// Returns distinct external secret names referenced by valid entries, sorted.
    #[must_use]
    pub fn unique_remote_secret_names(&self) -> Vec<String> {
        self.specifications()
            .flat_map(ResourceSpecification::remote_secrets)
            .map(|reference| reference.remote_secret_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn valid_mut(&mut self, name: &str) -> AppResult<&mut ResourceSpecification> {
        match self.entries.get_mut(name) {
            Some(DeclaredEntry::Valid(specification)) => Ok(specification),
            Some(DeclaredEntry::Invalid(_)) => Err(AppError::Validation(format!(
                "declared entry '{name}' has errors"
            ))),
            None => Err(AppError::NotFound(format!(
                "no declared entry with name \"{name}\""
            ))),
        }
    }
}

/// Declared state of every kind for one revision of the manifest source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclaredSnapshot {
    /// Declared apps.
    pub apps: DeclaredState,
    /// Declared jobs.
    pub jobs: DeclaredState,
}

impl DeclaredSnapshot {
    /// Returns the declared state for one kind.
    #[must_use]
    pub fn state(&self, kind: ResourceKind) -> &DeclaredState {
        match kind {
            ResourceKind::App => &self.apps,
            ResourceKind::Job => &self.jobs,
        }
    }

    /// Returns the mutable declared state for one kind.
    pub fn state_mut(&mut self, kind: ResourceKind) -> &mut DeclaredState {
        match kind {
            ResourceKind::App => &mut self.apps,
            ResourceKind::Job => &mut self.jobs,
        }
    }

    /// Adds a valid specification to the state of its kind.
    pub fn insert(&mut self, specification: ResourceSpecification) -> AppResult<()> {
        self.state_mut(specification.kind()).insert(specification)
    }

    /// Combines errors across every kind.
    #[must_use]
    pub fn error(&self) -> Option<AppError> {
        let mut errors = ErrorList::new();
        for kind in ResourceKind::ALL {
            if let Some(error) = self.state(kind).error() {
                match error {
                    AppError::Multiple(list) => {
                        for message in list.errors() {
                            errors.push(AppError::Validation(strip_category(message)));
                        }
                    }
                    other => errors.push(other),
                }
            }
        }

        errors.into_error()
    }

    /// Returns distinct external secret names across every kind, sorted.
    #[must_use]
    pub fn unique_remote_secret_names(&self) -> Vec<String> {
        ResourceKind::ALL
            .iter()
            .flat_map(|kind| self.state(*kind).unique_remote_secret_names())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn strip_category(error: &AppError) -> String {
    match error {
        AppError::Validation(message) => message.clone(),
        other => other.to_string(),
    }
}
