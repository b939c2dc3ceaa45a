//! Redis-backed reconcile caches.

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tidegate_application::{FingerprintStore, NotificationCache, RevisionCache};
use tidegate_core::{AppError, AppResult};
use tidegate_domain::{Fingerprint, NotificationEvent, ResourceKind};

/// Redis connection settings shared by every reconcile cache.
#[derive(Clone)]
pub struct RedisCacheClient {
    client: redis::Client,
    key_prefix: String,
}

impl RedisCacheClient {
    /// Creates cache settings with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key(&self, namespace: &str, name: &str) -> String {
        format!("{}:{namespace}:{name}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }

    async fn read_json<T: DeserializeOwned>(&self, key: String) -> AppResult<Option<T>> {
        let mut connection = self.connection().await?;
        let encoded: Option<String> = connection.get(key.as_str()).await.map_err(|error| {
            AppError::Internal(format!("failed to read cache entry '{key}': {error}"))
        })?;

        encoded
            .as_deref()
            .map(|value| {
                serde_json::from_str(value).map_err(|error| {
                    AppError::Internal(format!("invalid cache entry '{key}': {error}"))
                })
            })
            .transpose()
    }

    async fn write_json<T: Serialize + Sync>(
        &self,
        key: String,
        value: &T,
        ttl_seconds: Option<u64>,
    ) -> AppResult<()> {
        let encoded = serde_json::to_string(value).map_err(|error| {
            AppError::Internal(format!("failed to encode cache entry '{key}': {error}"))
        })?;
        let mut connection = self.connection().await?;

        let result: redis::RedisResult<()> = match ttl_seconds {
            Some(ttl_seconds) => connection.set_ex(key.as_str(), encoded, ttl_seconds).await,
            None => connection.set(key.as_str(), encoded).await,
        };

        result.map_err(|error| {
            AppError::Internal(format!("failed to write cache entry '{key}': {error}"))
        })
    }
}

/// Redis fingerprint store with a per-entry time to live.
#[derive(Clone)]
pub struct RedisFingerprintStore {
    redis: RedisCacheClient,
    ttl_seconds: u64,
}

impl RedisFingerprintStore {
    /// Creates a fingerprint store whose entries expire after `ttl_seconds`.
    #[must_use]
    pub fn new(redis: RedisCacheClient, ttl_seconds: u64) -> Self {
        Self {
            redis,
            ttl_seconds: ttl_seconds.max(1),
        }
    }

    fn key_for(&self, kind: ResourceKind, name: &str) -> String {
        self.redis.key(&format!("fingerprint:{kind}"), name)
    }
}

#[async_trait]
impl FingerprintStore for RedisFingerprintStore {
    async fn get(&self, kind: ResourceKind, name: &str) -> AppResult<Option<Fingerprint>> {
        self.redis.read_json(self.key_for(kind, name)).await
    }

    async fn set(
        &self,
        kind: ResourceKind,
        name: &str,
        fingerprint: Fingerprint,
    ) -> AppResult<()> {
        self.redis
            .write_json(self.key_for(kind, name), &fingerprint, Some(self.ttl_seconds))
            .await
    }
}

/// Redis holder of the last sent notification, without expiry.
#[derive(Clone)]
pub struct RedisNotificationCache {
    redis: RedisCacheClient,
}

impl RedisNotificationCache {
    /// Creates a notification cache.
    #[must_use]
    pub fn new(redis: RedisCacheClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl NotificationCache for RedisNotificationCache {
    async fn get(&self) -> AppResult<Option<NotificationEvent>> {
        self.redis.read_json(self.redis.key("notification", "last")).await
    }

    async fn set(&self, event: NotificationEvent) -> AppResult<()> {
        self.redis
            .write_json(self.redis.key("notification", "last"), &event, None)
            .await
    }
}

/// Redis holder of the last observed source revision, without expiry.
#[derive(Clone)]
pub struct RedisRevisionCache {
    redis: RedisCacheClient,
}

impl RedisRevisionCache {
    /// Creates a revision cache.
    #[must_use]
    pub fn new(redis: RedisCacheClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl RevisionCache for RedisRevisionCache {
    async fn get(&self) -> AppResult<Option<String>> {
        self.redis.read_json(self.redis.key("revision", "last")).await
    }

    async fn set(&self, revision: &str) -> AppResult<()> {
        self.redis
            .write_json(self.redis.key("revision", "last"), &revision, None)
            .await
    }
}
