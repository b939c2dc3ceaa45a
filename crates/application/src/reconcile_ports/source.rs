use async_trait::async_trait;
use tidegate_core::AppResult;
use tidegate_domain::DeclaredSnapshot;

/// Declared state read from the source of truth together with its revision.
#[derive(Debug, Clone, Default)]
pub struct DeclaredSource {
    /// Parsed entries for every kind; parse failures are kept as error entries.
    pub snapshot: DeclaredSnapshot,
    /// Revision identifier of the source, e.g. a commit hash.
    pub revision: String,
}

/// Port for reading declared state.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Returns the current declared snapshot and revision.
    async fn fetch(&self) -> AppResult<DeclaredSource>;
}
