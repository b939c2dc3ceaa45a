//! Application services and ports.

#![forbid(unsafe_code)]

mod fingerprint_cache;
mod notification_service;
mod reconcile_ports;
mod reconcile_service;
mod secret_resolver;

pub use fingerprint_cache::FingerprintCache;
pub use notification_service::NotificationDeduplicator;
pub use reconcile_ports::{
    DeclaredSource, FingerprintStore, ManifestSource, MetricsSink, NotificationCache, Notifier,
    ResourceRemote, RevisionCache, SecretStore, SecretValue,
};
pub use reconcile_service::{
    PassReport, ReconcileAction, ReconcileActionType, ReconcileConfig, ReconcileService,
    ResourceRemotes, metric_names,
};
pub use secret_resolver::{RegistryCredentials, ResolvedSecrets, SecretResolver};
