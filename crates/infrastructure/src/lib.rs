//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod directory_secret_store;
mod github_commit_status_notifier;
mod http_resource_remote;
mod in_memory_manifest_source;
mod in_memory_reconcile_caches;
mod in_memory_resource_remote;
mod in_memory_secret_store;
mod json_directory_manifest_source;
mod local_notifiers;
mod metrics_sinks;
mod redis_reconcile_caches;

pub use directory_secret_store::DirectorySecretStore;
pub use github_commit_status_notifier::GitHubCommitStatusNotifier;
pub use http_resource_remote::HttpResourceRemote;
pub use in_memory_manifest_source::InMemoryManifestSource;
pub use in_memory_reconcile_caches::{
    InMemoryFingerprintStore, InMemoryNotificationCache, InMemoryRevisionCache,
};
pub use in_memory_resource_remote::{InMemoryResourceRemote, RemoteAction, RemoteOperation};
pub use in_memory_secret_store::InMemorySecretStore;
pub use json_directory_manifest_source::{JsonDirectoryManifestSource, MANIFEST_API_VERSION};
pub use local_notifiers::{DiscardNotifier, InMemoryNotifier, LoggingNotifier};
pub use metrics_sinks::{InMemoryMetricsSink, MetricValue, TracingMetricsSink};
pub use redis_reconcile_caches::{
    RedisCacheClient, RedisFingerprintStore, RedisNotificationCache, RedisRevisionCache,
};
