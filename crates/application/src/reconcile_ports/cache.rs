use async_trait::async_trait;
use tidegate_core::AppResult;
use tidegate_domain::{Fingerprint, NotificationEvent, ResourceKind};

/// Storage port for per-resource fingerprints.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Returns the fingerprint recorded for one resource.
    async fn get(&self, kind: ResourceKind, name: &str) -> AppResult<Option<Fingerprint>>;

    /// Records the fingerprint for one resource.
    async fn set(&self, kind: ResourceKind, name: &str, fingerprint: Fingerprint)
    -> AppResult<()>;
}

/// Storage port for the last sent notification.
#[async_trait]
pub trait NotificationCache: Send + Sync {
    /// Returns the last sent notification event.
    async fn get(&self) -> AppResult<Option<NotificationEvent>>;

    /// Replaces the last sent notification event.
    async fn set(&self, event: NotificationEvent) -> AppResult<()>;
}

/// Storage port for the last observed source revision.
#[async_trait]
pub trait RevisionCache: Send + Sync {
    /// Returns the last observed revision.
    async fn get(&self) -> AppResult<Option<String>>;

    /// Replaces the last observed revision.
    async fn set(&self, revision: &str) -> AppResult<()>;
}
