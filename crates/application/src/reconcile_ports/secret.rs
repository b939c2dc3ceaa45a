use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tidegate_core::AppResult;

/// Secret value with the time it last changed in the store.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue {
    /// Literal secret value.
    pub value: String,
    /// Last change time reported by the store.
    pub changed_at: DateTime<Utc>,
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SecretValue")
            .field("value", &"<redacted>")
            .field("changed_at", &self.changed_at)
            .finish()
    }
}

/// Port for the external secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Lists secret names with their last change time.
    async fn list_items(&self) -> AppResult<BTreeMap<String, DateTime<Utc>>>;

    /// Reads one secret value.
    async fn get(&self, name: &str) -> AppResult<SecretValue>;
}
