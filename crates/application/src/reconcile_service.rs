use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

use tidegate_core::{AppError, AppResult};
use tidegate_domain::{
    ChangeReason, DeclaredSnapshot, DeclaredState, LiveState, NotificationEvent, ResourceKind,
};
use tracing::{debug, info, warn};

use crate::fingerprint_cache::FingerprintCache;
use crate::notification_service::NotificationDeduplicator;
use crate::reconcile_ports::{
    DeclaredSource, FingerprintStore, ManifestSource, MetricsSink, NotificationCache, Notifier,
    ResourceRemote, SecretStore,
};
use crate::secret_resolver::{RegistryCredentials, ResolvedSecrets, SecretResolver};

mod converge;
mod pass;

/// Metric names recorded once per pass.
pub mod metric_names {
    /// Integer metric, always 1.
    pub const RECONCILE_COUNT: &str = "reconcile_count";
    /// Duration of the pass.
    pub const RECONCILE_DURATION: &str = "reconcile_duration";
    /// Whether the pass succeeded.
    pub const RECONCILE_SUCCESS: &str = "reconcile_success";
}

/// Static engine configuration.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Region the reconciler runs in, compared against location filters.
    pub location: String,
    /// Registry credentials injected into every applied resource.
    pub registry: Option<RegistryCredentials>,
    /// Name attached to every notification event.
    pub notification_name: String,
}

/// Remote collaborators, one per resource kind.
#[derive(Clone)]
pub struct ResourceRemotes {
    /// Remote for container apps.
    pub apps: Arc<dyn ResourceRemote>,
    /// Remote for container jobs.
    pub jobs: Arc<dyn ResourceRemote>,
}

impl ResourceRemotes {
    fn get(&self, kind: ResourceKind) -> &Arc<dyn ResourceRemote> {
        match kind {
            ResourceKind::App => &self.apps,
            ResourceKind::Job => &self.jobs,
        }
    }
}

/// Remote mutation performed during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileActionType {
    /// Resource created.
    Create,
    /// Existing managed resource replaced.
    Update,
    /// Managed resource no longer declared was deleted.
    Delete,
}

impl ReconcileActionType {
    /// Returns stable action value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl Display for ReconcileActionType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One remote mutation with the resource it targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileAction {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource name.
    pub name: String,
    /// Mutation performed.
    pub action_type: ReconcileActionType,
    /// Fingerprint decision behind a create or update.
    pub reason: Option<ChangeReason>,
}

/// Summary of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Declared-state revision that was reconciled.
    pub revision: String,
    /// Remote mutations in execution order.
    pub actions: Vec<ReconcileAction>,
}

/// Reconcile engine converging live resources toward declared state.
#[derive(Clone)]
pub struct ReconcileService {
    config: ReconcileConfig,
    source: Arc<dyn ManifestSource>,
    remotes: ResourceRemotes,
    secret_resolver: Arc<SecretResolver>,
    fingerprints: FingerprintCache,
    notifications: Option<NotificationDeduplicator>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl ReconcileService {
    /// Creates a reconcile service.
    #[must_use]
    pub fn new(
        config: ReconcileConfig,
        source: Arc<dyn ManifestSource>,
        remotes: ResourceRemotes,
        secret_store: Arc<dyn SecretStore>,
        fingerprint_store: Arc<dyn FingerprintStore>,
    ) -> Self {
        Self {
            config,
            source,
            remotes,
            secret_resolver: Arc::new(SecretResolver::new(secret_store)),
            fingerprints: FingerprintCache::new(fingerprint_store),
            notifications: None,
            metrics: None,
        }
    }

    /// Adds deduplicated pass notifications.
    #[must_use]
    pub fn with_notifications(
        mut self,
        cache: Arc<dyn NotificationCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        self.notifications = Some(NotificationDeduplicator::new(cache, notifier));
        self
    }

    /// Adds per-pass metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests;
