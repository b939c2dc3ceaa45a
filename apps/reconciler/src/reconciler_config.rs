use std::env;
use std::fmt;
use std::path::PathBuf;

use tidegate_application::RegistryCredentials;
use tidegate_core::{AppError, AppResult};
use tracing::info;
use url::Url;

const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Remote platform endpoints used to list and mutate live resources.
#[derive(Clone)]
pub enum RemoteConfig {
    /// No endpoints configured; passes run against in-process remotes.
    InMemory,
    /// Platform REST endpoints for both resource kinds.
    Http {
        apps_base_url: String,
        jobs_base_url: String,
        token: Option<String>,
    },
}

/// Backend for fingerprint, notification and revision caches.
#[derive(Clone)]
pub enum CacheConfig {
    /// Process-local caches, lost on restart.
    InMemory,
    /// Shared Redis caches.
    Redis { url: String, key_prefix: String },
}

/// Destination for pass outcome notifications.
#[derive(Clone)]
pub enum NotifierConfig {
    /// Outcomes are dropped.
    None,
    /// Outcomes are written to the log.
    Log,
    /// Outcomes are published as GitHub commit statuses.
    GitHub {
        api_base_url: String,
        repository: String,
        token: String,
    },
}

/// Runtime configuration for the reconciler process.
#[derive(Clone)]
pub struct ReconcilerConfig {
    pub manifest_path: PathBuf,
    pub location: String,
    pub environment_id: String,
    pub remote: RemoteConfig,
    pub secrets_path: PathBuf,
    pub registry: Option<RegistryCredentials>,
    pub cache: CacheConfig,
    pub fingerprint_cache_ttl_seconds: u64,
    pub notifier: NotifierConfig,
    pub notification_group: String,
    pub reconcile_interval_seconds: u64,
    pub reconcile_once: bool,
    pub debug: bool,
}

impl ReconcilerConfig {
    /// Reads the configuration from process environment variables.
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(&|name| env::var(name).ok())
    }

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> AppResult<Self> {
        let env = EnvReader { lookup };

        let manifest_path = PathBuf::from(env.required("MANIFEST_PATH")?);
        let location = env.required("LOCATION")?;
        let environment_id = env.optional("ENVIRONMENT_ID").unwrap_or_default();
        let secrets_path = PathBuf::from(env.required("SECRETS_PATH")?);

        let remote = match (
            env.optional("APPS_API_BASE_URL"),
            env.optional("JOBS_API_BASE_URL"),
        ) {
            (Some(apps_base_url), Some(jobs_base_url)) => RemoteConfig::Http {
                apps_base_url,
                jobs_base_url,
                token: env.optional("REMOTE_API_TOKEN"),
            },
            (None, None) => RemoteConfig::InMemory,
            _ => {
                return Err(AppError::Validation(
                    "APPS_API_BASE_URL and JOBS_API_BASE_URL must be set together".to_owned(),
                ));
            }
        };

        let registry = match (
            env.optional("CONTAINER_REGISTRY_SERVER"),
            env.optional("CONTAINER_REGISTRY_USERNAME"),
            env.optional("CONTAINER_REGISTRY_PASSWORD"),
        ) {
            (Some(server), Some(username), Some(password)) => Some(RegistryCredentials {
                server,
                username,
                password,
            }),
            (None, None, None) => None,
            _ => {
                return Err(AppError::Validation(
                    "CONTAINER_REGISTRY_SERVER, CONTAINER_REGISTRY_USERNAME and CONTAINER_REGISTRY_PASSWORD must be set together"
                        .to_owned(),
                ));
            }
        };

        let cache = match env.optional("REDIS_URL") {
            Some(url) => CacheConfig::Redis {
                url,
                key_prefix: env
                    .optional("REDIS_KEY_PREFIX")
                    .unwrap_or_else(|| "tidegate".to_owned()),
            },
            None => CacheConfig::InMemory,
        };

        let notifier = match env
            .optional("NOTIFICATION_PROVIDER")
            .unwrap_or_else(|| "none".to_owned())
            .as_str()
        {
            "none" => NotifierConfig::None,
            "log" => NotifierConfig::Log,
            "github" => NotifierConfig::GitHub {
                api_base_url: env
                    .optional("GITHUB_API_URL")
                    .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_owned()),
                repository: env.required("GITHUB_REPOSITORY")?,
                token: env.required("GITHUB_TOKEN")?,
            },
            other => {
                return Err(AppError::Validation(format!(
                    "NOTIFICATION_PROVIDER must be one of 'none', 'log' or 'github', got '{other}'"
                )));
            }
        };

        let notification_group = env
            .optional("NOTIFICATION_GROUP")
            .unwrap_or_else(|| "apps".to_owned());
        let fingerprint_cache_ttl_seconds = env.parse_u64("FINGERPRINT_CACHE_TTL_SECONDS", 3600)?;
        let reconcile_interval_seconds = env.parse_u64("RECONCILE_INTERVAL_SECONDS", 300)?;
        let reconcile_once = env.parse_bool("RECONCILE_ONCE", false)?;
        let debug = env.parse_bool("DEBUG", false)?;

        if fingerprint_cache_ttl_seconds == 0 {
            return Err(AppError::Validation(
                "FINGERPRINT_CACHE_TTL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if reconcile_interval_seconds == 0 {
            return Err(AppError::Validation(
                "RECONCILE_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            manifest_path,
            location,
            environment_id,
            remote,
            secrets_path,
            registry,
            cache,
            fingerprint_cache_ttl_seconds,
            notifier,
            notification_group,
            reconcile_interval_seconds,
            reconcile_once,
            debug,
        })
    }

    /// Logs the effective configuration without credentials.
    pub fn log_summary(&self) {
        let (apps_api_base_url, jobs_api_base_url, remote_token_set) = match &self.remote {
            RemoteConfig::InMemory => ("in-memory", "in-memory", false),
            RemoteConfig::Http {
                apps_base_url,
                jobs_base_url,
                token,
            } => (
                apps_base_url.as_str(),
                jobs_base_url.as_str(),
                token.is_some(),
            ),
        };
        let cache = match &self.cache {
            CacheConfig::InMemory => "in-memory".to_owned(),
            CacheConfig::Redis { url, key_prefix } => {
                format!("{} (prefix {key_prefix})", redact_url(url))
            }
        };

        info!(
            manifest_path = %self.manifest_path.display(),
            location = %self.location,
            environment_id = %self.environment_id,
            apps_api_base_url,
            jobs_api_base_url,
            remote_token_set,
            secrets_path = %self.secrets_path.display(),
            registry_server = self.registry.as_ref().map_or("none", |registry| registry.server.as_str()),
            cache = %cache,
            fingerprint_cache_ttl_seconds = self.fingerprint_cache_ttl_seconds,
            notifier = self.notifier.name(),
            notification_group = %self.notification_group,
            reconcile_interval_seconds = self.reconcile_interval_seconds,
            reconcile_once = self.reconcile_once,
            "reconciler configuration loaded"
        );
    }
}

impl NotifierConfig {
    fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Log => "log",
            Self::GitHub { .. } => "github",
        }
    }
}

impl fmt::Debug for ReconcilerConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ReconcilerConfig")
            .field("manifest_path", &self.manifest_path)
            .field("location", &self.location)
            .field("environment_id", &self.environment_id)
            .field("secrets_path", &self.secrets_path)
            .field("registry", &self.registry)
            .field("notifier", &self.notifier.name())
            .field("notification_group", &self.notification_group)
            .field("reconcile_interval_seconds", &self.reconcile_interval_seconds)
            .field("reconcile_once", &self.reconcile_once)
            .finish_non_exhaustive()
    }
}

struct EnvReader<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl EnvReader<'_> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> AppResult<String> {
        self.optional(name)
            .ok_or_else(|| AppError::Validation(format!("{name} is required")))
    }

    fn parse_u64(&self, name: &str, default: u64) -> AppResult<u64> {
        match self.optional(name) {
            Some(value) => value.parse::<u64>().map_err(|error| {
                AppError::Validation(format!("invalid {name} value '{value}': {error}"))
            }),
            None => Ok(default),
        }
    }

    fn parse_bool(&self, name: &str, default: bool) -> AppResult<bool> {
        match self.optional(name) {
            Some(value) => parse_bool(&value).ok_or_else(|| {
                AppError::Validation(format!(
                    "invalid {name} value '{value}': expected true or false"
                ))
            }),
            None => Ok(default),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn redact_url(value: &str) -> String {
    match Url::parse(value) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("redacted")).is_err() {
                return "<invalid url>".to_owned();
            }
            url.to_string()
        }
        Err(_) => "<invalid url>".to_owned(),
    }
}
