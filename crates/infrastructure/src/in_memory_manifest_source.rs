use async_trait::async_trait;
use tidegate_application::{DeclaredSource, ManifestSource};
use tidegate_core::AppResult;
use tidegate_domain::DeclaredSnapshot;
use tokio::sync::RwLock;

/// In-memory manifest source returning a replaceable snapshot.
pub struct InMemoryManifestSource {
    source: RwLock<DeclaredSource>,
}

impl InMemoryManifestSource {
    /// Creates a source serving `snapshot` at `revision`.
    #[must_use]
    pub fn new(snapshot: DeclaredSnapshot, revision: impl Into<String>) -> Self {
        Self {
            source: RwLock::new(DeclaredSource {
                snapshot,
                revision: revision.into(),
            }),
        }
    }

    /// Replaces the served snapshot and revision.
    pub async fn replace(&self, snapshot: DeclaredSnapshot, revision: impl Into<String>) {
        *self.source.write().await = DeclaredSource {
            snapshot,
            revision: revision.into(),
        };
    }
}

#[async_trait]
impl ManifestSource for InMemoryManifestSource {
    async fn fetch(&self) -> AppResult<DeclaredSource> {
        Ok(self.source.read().await.clone())
    }
}
