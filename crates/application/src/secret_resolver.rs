use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tidegate_core::{AppError, AppResult};
use tidegate_domain::{DeclaredState, RemoteSecretReference};
use tokio::sync::Mutex;
use tracing::debug;

use crate::reconcile_ports::SecretStore;

/// Container registry credentials injected into every applied resource.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    /// Registry server host.
    pub server: String,
    /// Registry username.
    pub username: String,
    /// Registry password.
    pub password: String,
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RegistryCredentials")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Secret values resolved for one pass, keyed by store secret name.
#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    values: BTreeMap<String, String>,
}

impl ResolvedSecrets {
    /// Returns one resolved value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Returns the number of resolved secrets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when nothing was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_list()
            .entries(self.values.keys())
            .finish()
    }
}

#[derive(Clone)]
struct CachedSecret {
    value: String,
    changed_at: DateTime<Utc>,
}

/// Resolves remote secret references into literal values.
///
/// Values are cached for the process lifetime and re-read only when the
/// store reports a different last-changed time.
pub struct SecretResolver {
    store: Arc<dyn SecretStore>,
    cache: Mutex<HashMap<String, CachedSecret>>,
}

impl SecretResolver {
    /// Creates a resolver over a secret store.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves every named secret, failing when one is missing from the store.
    pub async fn resolve(&self, names: &[String]) -> AppResult<ResolvedSecrets> {
        if names.is_empty() {
            return Ok(ResolvedSecrets::default());
        }

        let items = self
            .store
            .list_items()
            .await
            .map_err(|error| error.context("failed to list secrets"))?;

        let mut cache = self.cache.lock().await;
        let mut values = BTreeMap::new();
        for name in names {
            let Some(listed_changed_at) = items.get(name) else {
                return Err(AppError::NotFound(format!("secret not found \"{name}\"")));
            };

            let is_stale = cache
                .get(name)
                .is_none_or(|cached| cached.changed_at != *listed_changed_at);
            if is_stale {
                debug!(name, "reading secret from store");
                let secret = self
                    .store
                    .get(name)
                    .await
                    .map_err(|error| error.context(format!("failed to get secret \"{name}\"")))?;
                cache.insert(
                    name.clone(),
                    CachedSecret {
                        value: secret.value,
                        changed_at: secret.changed_at,
                    },
                );
            }

            if let Some(cached) = cache.get(name) {
                values.insert(name.clone(), cached.value.clone());
            }
        }

        Ok(ResolvedSecrets { values })
    }

    /// Injects resolved secret values into one declared entry.
    pub fn inject_secrets(
        &self,
        state: &mut DeclaredState,
        name: &str,
        secrets: &ResolvedSecrets,
    ) -> AppResult<()> {
        let Some(specification) = state.get(name) else {
            return Err(AppError::NotFound(format!(
                "no declared entry with name \"{name}\""
            )));
        };
        let kind = specification.kind();
        let references: Vec<RemoteSecretReference> =
            specification.remote_secrets().cloned().collect();

        for (index, reference) in references.iter().enumerate() {
            let value = secrets
                .get(reference.remote_secret_name.as_str())
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "unable to get secret {index} for {kind} \"{name}\" from cache"
                    ))
                })?;

            state
                .set_secret(name, reference.secret_name.as_str(), value)
                .map_err(|error| {
                    error.context(format!(
                        "unable to set secret \"{}\" for {kind} \"{name}\"",
                        reference.secret_name
                    ))
                })?;
        }

        Ok(())
    }

    /// Injects registry credentials into one declared entry.
    pub fn inject_registry(
        &self,
        state: &mut DeclaredState,
        name: &str,
        registry: &RegistryCredentials,
    ) -> AppResult<()> {
        state
            .set_registry(
                name,
                registry.server.as_str(),
                registry.username.as_str(),
                registry.password.as_str(),
            )
            .map_err(|error| error.context(format!("unable to set registry for \"{name}\"")))
    }
}

#[cfg(test)]
mod tests;
