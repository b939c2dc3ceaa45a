use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tidegate_core::{AppError, AppResult};
use tidegate_domain::{
    DeclaredState, RemoteSecretReference, ResourceKind, ResourceSpecification,
    ResourceSpecificationInput,
};
use tokio::sync::Mutex;

use super::{RegistryCredentials, SecretResolver};
use crate::reconcile_ports::{SecretStore, SecretValue};

struct FakeSecretStore {
    secrets: Mutex<BTreeMap<String, SecretValue>>,
    get_calls: Mutex<Vec<String>>,
}

impl FakeSecretStore {
    fn new(secrets: &[(&str, &str, i64)]) -> Self {
        Self {
            secrets: Mutex::new(
                secrets
                    .iter()
                    .map(|(name, value, seconds)| {
                        (
                            (*name).to_owned(),
                            SecretValue {
                                value: (*value).to_owned(),
                                changed_at: timestamp(*seconds),
                            },
                        )
                    })
                    .collect(),
            ),
            get_calls: Mutex::new(Vec::new()),
        }
    }

    async fn rotate(&self, name: &str, value: &str, seconds: i64) {
        self.secrets.lock().await.insert(
            name.to_owned(),
            SecretValue {
                value: value.to_owned(),
                changed_at: timestamp(seconds),
            },
        );
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn list_items(&self) -> AppResult<BTreeMap<String, DateTime<Utc>>> {
        Ok(self
            .secrets
            .lock()
            .await
            .iter()
            .map(|(name, secret)| (name.clone(), secret.changed_at))
            .collect())
    }

    async fn get(&self, name: &str) -> AppResult<SecretValue> {
        self.get_calls.lock().await.push(name.to_owned());
        self.secrets
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("secret '{name}' does not exist")))
    }
}

fn timestamp(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .unwrap_or_else(|| unreachable!())
}

fn declared_state(remote_secrets: Vec<RemoteSecretReference>) -> DeclaredState {
    let specification = ResourceSpecification::new(ResourceSpecificationInput {
        kind: ResourceKind::App,
        api_version: "tidegate.io/v1".to_owned(),
        metadata: BTreeMap::from([("name".to_owned(), "foo".to_owned())]),
        payload: json!({"properties": {"configuration": {}}}),
        remote_secrets,
        location_filter: Vec::new(),
        image_replacements: Vec::new(),
    })
    .unwrap_or_else(|_| unreachable!());

    let mut state = DeclaredState::new();
    assert!(state.insert(specification).is_ok());
    state
}

#[tokio::test]
async fn resolve_fails_for_unknown_secret() {
    let resolver = SecretResolver::new(Arc::new(FakeSecretStore::new(&[("known", "v", 1)])));

    let result = resolver
        .resolve(&["known".to_owned(), "missing".to_owned()])
        .await;

    assert!(
        matches!(result, Err(AppError::NotFound(message)) if message == "secret not found \"missing\"")
    );
}

#[tokio::test]
async fn resolve_reads_store_only_when_secret_changed() {
    let store = Arc::new(FakeSecretStore::new(&[("db-password", "first", 1)]));
    let resolver = SecretResolver::new(store.clone());
    let names = vec!["db-password".to_owned()];

    let first = resolver.resolve(&names).await;
    assert_eq!(
        first.ok().and_then(|secrets| secrets.get("db-password").map(str::to_owned)),
        Some("first".to_owned())
    );

    let second = resolver.resolve(&names).await;
    assert!(second.is_ok());
    assert_eq!(store.get_calls.lock().await.len(), 1);

    store.rotate("db-password", "second", 2).await;
    let third = resolver.resolve(&names).await;
    assert_eq!(
        third.ok().and_then(|secrets| secrets.get("db-password").map(str::to_owned)),
        Some("second".to_owned())
    );
    assert_eq!(store.get_calls.lock().await.len(), 2);
}

#[tokio::test]
async fn resolve_without_names_skips_store() {
    let resolver = SecretResolver::new(Arc::new(FakeSecretStore::new(&[])));
    let resolved = resolver.resolve(&[]).await;
    assert!(resolved.is_ok_and(|secrets| secrets.is_empty()));
}

#[tokio::test]
async fn inject_secrets_writes_literal_values() {
    let resolver = SecretResolver::new(Arc::new(FakeSecretStore::new(&[("remote-db", "s3cret", 1)])));
    let mut state = declared_state(vec![RemoteSecretReference::new("db", "remote-db")]);
    let secrets = resolver
        .resolve(&state.unique_remote_secret_names())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(resolver.inject_secrets(&mut state, "foo", &secrets).is_ok());

    let payload = state
        .get("foo")
        .map(|specification| specification.payload().clone())
        .unwrap_or_default();
    assert_eq!(
        payload["properties"]["configuration"]["secrets"],
        json!([{"name": "db", "value": "s3cret"}])
    );
}

#[tokio::test]
async fn inject_secrets_rejects_duplicate_secret_names() {
    let resolver = SecretResolver::new(Arc::new(FakeSecretStore::new(&[("remote-db", "s3cret", 1)])));
    let mut state = declared_state(vec![
        RemoteSecretReference::new("db", "remote-db"),
        RemoteSecretReference::new("db", "remote-db"),
    ]);
    let secrets = resolver
        .resolve(&state.unique_remote_secret_names())
        .await
        .unwrap_or_else(|_| unreachable!());

    let result = resolver.inject_secrets(&mut state, "foo", &secrets);
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn inject_registry_adds_credentials_once() {
    let resolver = SecretResolver::new(Arc::new(FakeSecretStore::new(&[])));
    let mut state = declared_state(Vec::new());
    let registry = RegistryCredentials {
        server: "registry.example.com".to_owned(),
        username: "puller".to_owned(),
        password: "hunter2".to_owned(),
    };

    assert!(resolver.inject_registry(&mut state, "foo", &registry).is_ok());
    let second = resolver.inject_registry(&mut state, "foo", &registry);
    assert!(second.is_err());

    let payload = state
        .get("foo")
        .map(|specification| specification.payload().clone())
        .unwrap_or_default();
    assert_eq!(
        payload["properties"]["configuration"]["registries"][0]["passwordSecretRef"],
        json!("azcagit-reg-cred")
    );
    assert!(!format!("{registry:?}").contains("hunter2"));
}
