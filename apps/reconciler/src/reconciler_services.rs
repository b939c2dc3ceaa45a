use std::sync::Arc;

use tidegate_application::{
    FingerprintStore, ManifestSource, NotificationCache, Notifier, ReconcileConfig,
    ReconcileService, ResourceRemote, ResourceRemotes, RevisionCache,
};
use tidegate_core::{AppError, AppResult};
use tidegate_domain::ResourceKind;
use tidegate_infrastructure::{
    DirectorySecretStore, DiscardNotifier, GitHubCommitStatusNotifier, HttpResourceRemote,
    InMemoryFingerprintStore, InMemoryNotificationCache, InMemoryResourceRemote,
    InMemoryRevisionCache, JsonDirectoryManifestSource, LoggingNotifier, RedisCacheClient,
    RedisFingerprintStore, RedisNotificationCache, RedisRevisionCache, TracingMetricsSink,
};
use tracing::warn;

use crate::reconciler_config::{CacheConfig, NotifierConfig, ReconcilerConfig, RemoteConfig};

struct Caches {
    fingerprints: Arc<dyn FingerprintStore>,
    notification: Arc<dyn NotificationCache>,
    revision: Arc<dyn RevisionCache>,
}

/// Wires adapters for the configured backends into a reconcile service.
pub fn build_reconcile_service(
    config: &ReconcilerConfig,
    http_client: &reqwest::Client,
) -> AppResult<ReconcileService> {
    let caches = build_caches(config)?;
    let remotes = build_remotes(config, http_client)?;
    let notifier = build_notifier(config, http_client)?;

    let source: Arc<dyn ManifestSource> = Arc::new(
        JsonDirectoryManifestSource::new(
            config.manifest_path.clone(),
            config.location.clone(),
            config.environment_id.clone(),
        )
        .with_revision_cache(caches.revision),
    );

    let engine_config = ReconcileConfig {
        location: config.location.clone(),
        registry: config.registry.clone(),
        notification_name: config.notification_group.clone(),
    };

    Ok(ReconcileService::new(
        engine_config,
        source,
        remotes,
        Arc::new(DirectorySecretStore::new(config.secrets_path.clone())),
        caches.fingerprints,
    )
    .with_notifications(caches.notification, notifier)
    .with_metrics(Arc::new(TracingMetricsSink::new())))
}

fn build_caches(config: &ReconcilerConfig) -> AppResult<Caches> {
    match &config.cache {
        CacheConfig::InMemory => Ok(Caches {
            fingerprints: Arc::new(InMemoryFingerprintStore::new()),
            notification: Arc::new(InMemoryNotificationCache::new()),
            revision: Arc::new(InMemoryRevisionCache::new()),
        }),
        CacheConfig::Redis { url, key_prefix } => {
            let client = redis::Client::open(url.as_str()).map_err(|error| {
                AppError::Validation(format!("invalid REDIS_URL: {error}"))
            })?;
            let redis = RedisCacheClient::new(client, key_prefix.clone());

            Ok(Caches {
                fingerprints: Arc::new(RedisFingerprintStore::new(
                    redis.clone(),
                    config.fingerprint_cache_ttl_seconds,
                )),
                notification: Arc::new(RedisNotificationCache::new(redis.clone())),
                revision: Arc::new(RedisRevisionCache::new(redis)),
            })
        }
    }
}

fn build_remotes(
    config: &ReconcilerConfig,
    http_client: &reqwest::Client,
) -> AppResult<ResourceRemotes> {
    match &config.remote {
        RemoteConfig::InMemory => {
            warn!("no remote api configured, reconciling against in-process remotes");
            Ok(ResourceRemotes {
                apps: Arc::new(InMemoryResourceRemote::new(ResourceKind::App)),
                jobs: Arc::new(InMemoryResourceRemote::new(ResourceKind::Job)),
            })
        }
        RemoteConfig::Http {
            apps_base_url,
            jobs_base_url,
            token,
        } => {
            let apps: Arc<dyn ResourceRemote> = Arc::new(HttpResourceRemote::new(
                http_client.clone(),
                ResourceKind::App,
                apps_base_url,
                token.clone(),
            )?);
            let jobs: Arc<dyn ResourceRemote> = Arc::new(HttpResourceRemote::new(
                http_client.clone(),
                ResourceKind::Job,
                jobs_base_url,
                token.clone(),
            )?);

            Ok(ResourceRemotes { apps, jobs })
        }
    }
}

fn build_notifier(
    config: &ReconcilerConfig,
    http_client: &reqwest::Client,
) -> AppResult<Arc<dyn Notifier>> {
    Ok(match &config.notifier {
        NotifierConfig::None => Arc::new(DiscardNotifier),
        NotifierConfig::Log => Arc::new(LoggingNotifier::new()),
        NotifierConfig::GitHub {
            api_base_url,
            repository,
            token,
        } => Arc::new(GitHubCommitStatusNotifier::new(
            http_client.clone(),
            api_base_url.clone(),
            repository,
            token.clone(),
        )?),
    })
}
