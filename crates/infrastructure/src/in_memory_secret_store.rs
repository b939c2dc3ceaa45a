use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tidegate_application::{SecretStore, SecretValue};
use tidegate_core::{AppError, AppResult};
use tokio::sync::RwLock;

/// In-memory secret store.
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<BTreeMap<String, SecretValue>>,
}

impl InMemorySecretStore {
    /// Creates an empty secret store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores or replaces one secret, marking it changed now.
    pub async fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.set_changed_at(name, value, Utc::now()).await;
    }

    /// Stores or replaces one secret with an explicit change time.
    pub async fn set_changed_at(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
        changed_at: DateTime<Utc>,
    ) {
        self.secrets.write().await.insert(
            name.into(),
            SecretValue {
                value: value.into(),
                changed_at,
            },
        );
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn list_items(&self) -> AppResult<BTreeMap<String, DateTime<Utc>>> {
        Ok(self
            .secrets
            .read()
            .await
            .iter()
            .map(|(name, secret)| (name.clone(), secret.changed_at))
            .collect())
    }

    async fn get(&self, name: &str) -> AppResult<SecretValue> {
        self.secrets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("secret \"{name}\" not found")))
    }
}
