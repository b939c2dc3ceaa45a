use std::collections::HashMap;

use async_trait::async_trait;
use tidegate_application::{FingerprintStore, NotificationCache, RevisionCache};
use tidegate_core::AppResult;
use tidegate_domain::{Fingerprint, NotificationEvent, ResourceKind};
use tokio::sync::RwLock;

/// In-memory fingerprint store, kept for the process lifetime.
#[derive(Default)]
pub struct InMemoryFingerprintStore {
    entries: RwLock<HashMap<(ResourceKind, String), Fingerprint>>,
}

impl InMemoryFingerprintStore {
    /// Creates an empty in-memory fingerprint store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn get(&self, kind: ResourceKind, name: &str) -> AppResult<Option<Fingerprint>> {
        Ok(self
            .entries
            .read()
            .await
            .get(&(kind, name.to_owned()))
            .cloned())
    }

    async fn set(
        &self,
        kind: ResourceKind,
        name: &str,
        fingerprint: Fingerprint,
    ) -> AppResult<()> {
        self.entries
            .write()
            .await
            .insert((kind, name.to_owned()), fingerprint);
        Ok(())
    }
}

/// In-memory holder of the last sent notification.
#[derive(Default)]
pub struct InMemoryNotificationCache {
    last: RwLock<Option<NotificationEvent>>,
}

impl InMemoryNotificationCache {
    /// Creates an empty notification cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationCache for InMemoryNotificationCache {
    async fn get(&self) -> AppResult<Option<NotificationEvent>> {
        Ok(self.last.read().await.clone())
    }

    async fn set(&self, event: NotificationEvent) -> AppResult<()> {
        *self.last.write().await = Some(event);
        Ok(())
    }
}

/// In-memory holder of the last observed source revision.
#[derive(Default)]
pub struct InMemoryRevisionCache {
    revision: RwLock<Option<String>>,
}

impl InMemoryRevisionCache {
    /// Creates an empty revision cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevisionCache for InMemoryRevisionCache {
    async fn get(&self) -> AppResult<Option<String>> {
        Ok(self.revision.read().await.clone())
    }

    async fn set(&self, revision: &str) -> AppResult<()> {
        *self.revision.write().await = Some(revision.to_owned());
        Ok(())
    }
}
