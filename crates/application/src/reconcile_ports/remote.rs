use async_trait::async_trait;
use tidegate_core::AppResult;
use tidegate_domain::{LiveState, ResourceKind, ResourceSpecification};

/// Port for the remote platform API of one resource kind.
///
/// Implementations complete long-running operations before returning.
#[async_trait]
pub trait ResourceRemote: Send + Sync {
    /// Returns the resource kind this remote manages.
    fn kind(&self) -> ResourceKind;

    /// Lists every live resource of this kind, managed or not.
    async fn list(&self) -> AppResult<LiveState>;

    /// Creates one resource.
    async fn create(&self, name: &str, specification: &ResourceSpecification) -> AppResult<()>;

    /// Replaces one existing resource.
    async fn update(&self, name: &str, specification: &ResourceSpecification) -> AppResult<()>;

    /// Deletes one resource.
    async fn delete(&self, name: &str) -> AppResult<()>;
}
