use std::sync::Arc;

use tidegate_core::AppResult;
use tidegate_domain::{ChangeReason, Fingerprint, LiveResource, ResourceKind, ResourceSpecification};
use tracing::debug;

use crate::reconcile_ports::FingerprintStore;

/// Decides whether declared resources need a remote apply.
#[derive(Clone)]
pub struct FingerprintCache {
    store: Arc<dyn FingerprintStore>,
}

impl FingerprintCache {
    /// Creates a fingerprint cache over a storage backend.
    #[must_use]
    pub fn new(store: Arc<dyn FingerprintStore>) -> Self {
        Self { store }
    }

    /// Returns whether `desired` must be applied, with the reason.
    pub async fn needs_update(
        &self,
        kind: ResourceKind,
        name: &str,
        live: Option<&LiveResource>,
        desired: &ResourceSpecification,
    ) -> AppResult<(bool, ChangeReason)> {
        let cached = self.store.get(kind, name).await?;
        let reason = Fingerprint::detect_change(cached.as_ref(), live, desired)?;

        Ok((reason.requires_apply(), reason))
    }

    /// Records the fingerprint of a verified resource.
    ///
    /// Does nothing when the live resource is absent or carries no timestamp.
    pub async fn set(
        &self,
        kind: ResourceKind,
        name: &str,
        live: Option<&LiveResource>,
        desired: &ResourceSpecification,
    ) -> AppResult<()> {
        let Some(live) = live else {
            debug!(%kind, name, "skipping fingerprint without live resource");
            return Ok(());
        };
        let Some(fingerprint) = Fingerprint::observe(live, desired)? else {
            debug!(%kind, name, "skipping fingerprint without live timestamp");
            return Ok(());
        };

        self.store.set(kind, name, fingerprint).await
    }
}
