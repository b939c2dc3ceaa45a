//! Secret store reading one file per secret from a mounted directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tidegate_application::{SecretStore, SecretValue};
use tidegate_core::{AppError, AppResult};

/// Secret store backed by a directory: file name is the secret name, file
/// content the value and file modification time the last change.
#[derive(Debug, Clone)]
pub struct DirectorySecretStore {
    root: PathBuf,
}

impl DirectorySecretStore {
    /// Creates a store reading secrets below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn secret_path(&self, name: &str) -> AppResult<PathBuf> {
        if !is_secret_name(name) {
            return Err(AppError::Validation(format!(
                "invalid secret name \"{name}\""
            )));
        }

        Ok(self.root.join(name))
    }
}

#[async_trait]
impl SecretStore for DirectorySecretStore {
    async fn list_items(&self) -> AppResult<BTreeMap<String, DateTime<Utc>>> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to read secrets directory '{}': {error}",
                self.root.display()
            ))
        })?;

        let mut items = BTreeMap::new();
        while let Some(entry) = entries.next_entry().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to read secrets directory '{}': {error}",
                self.root.display()
            ))
        })? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !is_secret_name(name.as_str()) {
                continue;
            }

            let path = entry.path();
            let metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|error| read_error(&path, error))?;
            if !metadata.is_file() {
                continue;
            }

            items.insert(name, modified_at(&path, &metadata)?);
        }

        Ok(items)
    }

    async fn get(&self, name: &str) -> AppResult<SecretValue> {
        let path = self.secret_path(name)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(AppError::NotFound(format!("secret \"{name}\" not found"))),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!("secret \"{name}\" not found")));
            }
            Err(error) => return Err(read_error(&path, error)),
        };

        let value = tokio::fs::read_to_string(&path)
            .await
            .map_err(|error| read_error(&path, error))?;

        Ok(SecretValue {
            value: strip_trailing_newline(value),
            changed_at: modified_at(&path, &metadata)?,
        })
    }
}

// Mounted secret volumes carry dot-prefixed bookkeeping entries.
fn is_secret_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
}

fn modified_at(path: &Path, metadata: &std::fs::Metadata) -> AppResult<DateTime<Utc>> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .map_err(|error| read_error(path, error))
}

fn strip_trailing_newline(mut value: String) -> String {
    if value.ends_with('\n') {
        value.pop();
        if value.ends_with('\r') {
            value.pop();
        }
    }
    value
}

fn read_error(path: &Path, error: std::io::Error) -> AppError {
    AppError::Internal(format!("failed to read secret '{}': {error}", path.display()))
}
