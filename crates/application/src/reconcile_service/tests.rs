use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use tidegate_core::{AppError, AppResult};
use tidegate_domain::{
    ChangeReason, DeclaredSnapshot, Fingerprint, LiveResource, LiveState, NotificationEvent,
    NotificationState, RemoteSecretReference, ResourceKind, ResourceSpecification,
    ResourceSpecificationInput,
};
use tokio::sync::Mutex;

use super::{
    ReconcileActionType, ReconcileConfig, ReconcileService, ResourceRemotes, metric_names,
};
use crate::reconcile_ports::{
    DeclaredSource, FingerprintStore, ManifestSource, MetricsSink, NotificationCache, Notifier,
    ResourceRemote, SecretStore, SecretValue,
};
use crate::secret_resolver::RegistryCredentials;

struct FakeSource {
    snapshot: Mutex<DeclaredSnapshot>,
    revision: Mutex<String>,
}

#[async_trait]
impl ManifestSource for FakeSource {
    async fn fetch(&self) -> AppResult<DeclaredSource> {
        Ok(DeclaredSource {
            snapshot: self.snapshot.lock().await.clone(),
            revision: self.revision.lock().await.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RecordedAction {
    operation: &'static str,
    name: String,
    payload: Option<Value>,
}

struct FakeRemote {
    kind: ResourceKind,
    reads: Mutex<VecDeque<LiveState>>,
    actions: Mutex<Vec<RecordedAction>>,
    failing_operation: Mutex<Option<(&'static str, String)>>,
}

impl FakeRemote {
    fn new(kind: ResourceKind, reads: Vec<LiveState>) -> Self {
        Self {
            kind,
            reads: Mutex::new(reads.into()),
            actions: Mutex::new(Vec::new()),
            failing_operation: Mutex::new(None),
        }
    }

    async fn fail_on(&self, operation: &'static str, name: &str) {
        *self.failing_operation.lock().await = Some((operation, name.to_owned()));
    }

    async fn operations(&self) -> Vec<(&'static str, String)> {
        self.actions
            .lock()
            .await
            .iter()
            .map(|action| (action.operation, action.name.clone()))
            .collect()
    }

    async fn record(&self, operation: &'static str, name: &str, payload: Option<Value>) -> AppResult<()> {
        if self
            .failing_operation
            .lock()
            .await
            .as_ref()
            .is_some_and(|(failing, failing_name)| *failing == operation && failing_name == name)
        {
            return Err(AppError::Remote("operation rejected".to_owned()));
        }

        self.actions.lock().await.push(RecordedAction {
            operation,
            name: name.to_owned(),
            payload,
        });
        Ok(())
    }
}

#[async_trait]
impl ResourceRemote for FakeRemote {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn list(&self) -> AppResult<LiveState> {
        let mut reads = self.reads.lock().await;
        if reads.len() > 1 {
            return Ok(reads.pop_front().unwrap_or_default());
        }

        Ok(reads.front().cloned().unwrap_or_default())
    }

    async fn create(&self, name: &str, specification: &ResourceSpecification) -> AppResult<()> {
        self.record("create", name, Some(specification.payload().clone()))
            .await
    }

    async fn update(&self, name: &str, specification: &ResourceSpecification) -> AppResult<()> {
        self.record("update", name, Some(specification.payload().clone()))
            .await
    }

    async fn delete(&self, name: &str) -> AppResult<()> {
        self.record("delete", name, None).await
    }
}

#[derive(Default)]
struct FakeSecretStore {
    secrets: BTreeMap<String, String>,
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn list_items(&self) -> AppResult<BTreeMap<String, DateTime<Utc>>> {
        Ok(self
            .secrets
            .keys()
            .map(|name| (name.clone(), timestamp(1)))
            .collect())
    }

    async fn get(&self, name: &str) -> AppResult<SecretValue> {
        self.secrets
            .get(name)
            .map(|value| SecretValue {
                value: value.clone(),
                changed_at: timestamp(1),
            })
            .ok_or_else(|| AppError::NotFound(format!("secret '{name}' does not exist")))
    }
}

#[derive(Default)]
struct FakeFingerprintStore {
    entries: Mutex<HashMap<(ResourceKind, String), Fingerprint>>,
}

#[async_trait]
impl FingerprintStore for FakeFingerprintStore {
    async fn get(&self, kind: ResourceKind, name: &str) -> AppResult<Option<Fingerprint>> {
        Ok(self
            .entries
            .lock()
            .await
            .get(&(kind, name.to_owned()))
            .cloned())
    }

    async fn set(
        &self,
        kind: ResourceKind,
        name: &str,
        fingerprint: Fingerprint,
    ) -> AppResult<()> {
        self.entries
            .lock()
            .await
            .insert((kind, name.to_owned()), fingerprint);
        Ok(())
    }
}

#[derive(Default)]
struct FakeNotificationCache {
    last: Mutex<Option<NotificationEvent>>,
}

#[async_trait]
impl NotificationCache for FakeNotificationCache {
    async fn get(&self) -> AppResult<Option<NotificationEvent>> {
        Ok(self.last.lock().await.clone())
    }

    async fn set(&self, event: NotificationEvent) -> AppResult<()> {
        *self.last.lock().await = Some(event);
        Ok(())
    }
}

#[derive(Default)]
struct FakeNotifier {
    sent: Mutex<Vec<NotificationEvent>>,
    fail: Mutex<bool>,
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, event: &NotificationEvent) -> AppResult<()> {
        if *self.fail.lock().await {
            return Err(AppError::Remote("status api unavailable".to_owned()));
        }
        self.sent.lock().await.push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FakeMetrics {
    counts: Mutex<Vec<(String, i64)>>,
    durations: Mutex<Vec<String>>,
    successes: Mutex<Vec<(String, bool)>>,
}

#[async_trait]
impl MetricsSink for FakeMetrics {
    async fn record_int(&self, name: &str, value: i64) -> AppResult<()> {
        self.counts.lock().await.push((name.to_owned(), value));
        Ok(())
    }

    async fn record_duration(&self, name: &str, _value: Duration) -> AppResult<()> {
        self.durations.lock().await.push(name.to_owned());
        Ok(())
    }

    async fn record_success(&self, name: &str, success: bool) -> AppResult<()> {
        self.successes.lock().await.push((name.to_owned(), success));
        Ok(())
    }
}

struct Harness {
    service: ReconcileService,
    source: Arc<FakeSource>,
    apps: Arc<FakeRemote>,
    jobs: Arc<FakeRemote>,
    fingerprints: Arc<FakeFingerprintStore>,
    notifier: Arc<FakeNotifier>,
    metrics: Arc<FakeMetrics>,
}

impl Harness {
    fn new(snapshot: DeclaredSnapshot, app_reads: Vec<LiveState>) -> Self {
        Self::with_options(snapshot, app_reads, Vec::new(), &[], None)
    }

    fn with_options(
        snapshot: DeclaredSnapshot,
        app_reads: Vec<LiveState>,
        job_reads: Vec<LiveState>,
        secrets: &[(&str, &str)],
        registry: Option<RegistryCredentials>,
    ) -> Self {
        let source = Arc::new(FakeSource {
            snapshot: Mutex::new(snapshot),
            revision: Mutex::new("rev-1".to_owned()),
        });
        let apps = Arc::new(FakeRemote::new(ResourceKind::App, app_reads));
        let jobs = Arc::new(FakeRemote::new(ResourceKind::Job, job_reads));
        let fingerprints = Arc::new(FakeFingerprintStore::default());
        let notifier = Arc::new(FakeNotifier::default());
        let metrics = Arc::new(FakeMetrics::default());
        let secret_store = Arc::new(FakeSecretStore {
            secrets: secrets
                .iter()
                .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                .collect(),
        });

        let service = ReconcileService::new(
            ReconcileConfig {
                location: "West Europe".to_owned(),
                registry,
                notification_name: "apps".to_owned(),
            },
            source.clone(),
            ResourceRemotes {
                apps: apps.clone(),
                jobs: jobs.clone(),
            },
            secret_store,
            fingerprints.clone(),
        )
        .with_notifications(Arc::new(FakeNotificationCache::default()), notifier.clone())
        .with_metrics(metrics.clone());

        Self {
            service,
            source,
            apps,
            jobs,
            fingerprints,
            notifier,
            metrics,
        }
    }

    async fn total_actions(&self) -> usize {
        self.apps.actions.lock().await.len() + self.jobs.actions.lock().await.len()
    }
}

fn timestamp(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .unwrap_or_else(|| unreachable!())
}

fn specification_with(
    kind: ResourceKind,
    name: &str,
    remote_secrets: Vec<RemoteSecretReference>,
    location_filter: Vec<String>,
) -> ResourceSpecification {
    ResourceSpecification::new(ResourceSpecificationInput {
        kind,
        api_version: "tidegate.io/v1".to_owned(),
        metadata: BTreeMap::from([("name".to_owned(), name.to_owned())]),
        payload: json!({"properties": {"configuration": {}, "template": {"containers": []}}}),
        remote_secrets,
        location_filter,
        image_replacements: Vec::new(),
    })
    .unwrap_or_else(|_| unreachable!())
}

fn app(name: &str) -> ResourceSpecification {
    specification_with(ResourceKind::App, name, Vec::new(), Vec::new())
}

fn snapshot(specifications: Vec<ResourceSpecification>) -> DeclaredSnapshot {
    let mut snapshot = DeclaredSnapshot::default();
    for specification in specifications {
        assert!(snapshot.insert(specification).is_ok());
    }
    snapshot
}

fn live(resources: &[(&str, bool)]) -> LiveState {
    resources
        .iter()
        .map(|(name, managed)| {
            LiveResource::new(*name, json!({}), *managed).with_last_modified_at(timestamp(100))
        })
        .collect()
}

#[tokio::test]
async fn creates_missing_resource_and_records_fingerprint() {
    let harness = Harness::new(snapshot(vec![app("foo")]), vec![live(&[]), live(&[("foo", true)])]);

    let report = harness.service.reconcile().await;

    assert!(report.as_ref().is_ok_and(|report| report.revision == "rev-1"));
    let actions = report.map(|report| report.actions).unwrap_or_default();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action_type, ReconcileActionType::Create);
    assert_eq!(actions[0].reason, Some(ChangeReason::NotCached));
    assert_eq!(
        harness.apps.operations().await,
        vec![("create", "foo".to_owned())]
    );
    assert!(
        harness
            .fingerprints
            .entries
            .lock()
            .await
            .contains_key(&(ResourceKind::App, "foo".to_owned()))
    );
    assert_eq!(
        *harness.notifier.sent.lock().await,
        vec![NotificationEvent::success("rev-1", "apps")]
    );
}

#[tokio::test]
async fn deletes_managed_resource_missing_from_declared_state() {
    let harness = Harness::new(snapshot(Vec::new()), vec![live(&[("foo", true)])]);

    assert!(harness.service.reconcile().await.is_ok());
    assert_eq!(
        harness.apps.operations().await,
        vec![("delete", "foo".to_owned())]
    );
}

#[tokio::test]
async fn unmanaged_resource_missing_from_declared_state_is_left_alone() {
    let harness = Harness::new(snapshot(Vec::new()), vec![live(&[("foo", false)])]);

    assert!(harness.service.reconcile().await.is_ok());
    assert!(harness.apps.operations().await.is_empty());
}

#[tokio::test]
async fn existing_managed_resource_is_updated() {
    let harness = Harness::new(snapshot(vec![app("foo")]), vec![live(&[("foo", true)])]);

    assert!(harness.service.reconcile().await.is_ok());
    assert_eq!(
        harness.apps.operations().await,
        vec![("update", "foo".to_owned())]
    );
}

#[tokio::test]
async fn updating_unmanaged_resource_fails_the_pass() {
    let harness = Harness::new(snapshot(vec![app("foo")]), vec![live(&[("foo", false)])]);

    let result = harness.service.reconcile().await;

    assert!(matches!(
        &result,
        Err(AppError::Conflict(message)) if message == "trying to update a non-managed app: foo"
    ));
    assert!(harness.apps.operations().await.is_empty());
    let sent = harness.notifier.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].state, NotificationState::Failure);
}

#[tokio::test]
async fn declared_state_errors_stop_reconciliation() {
    let mut declared = snapshot(vec![app("foo")]);
    declared.apps.insert_error("broken.json", "metadata.name is missing");
    let harness = Harness::new(declared, vec![live(&[("bar", true)])]);

    let result = harness.service.reconcile().await;

    assert!(
        result
            .as_ref()
            .is_err_and(|error| error.to_string().contains("stopping reconciliation"))
    );
    assert_eq!(harness.total_actions().await, 0);
    let sent = harness.notifier.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].revision, "rev-1");
    assert!(sent[0].description.contains("metadata.name is missing"));
}

#[tokio::test]
async fn missing_secret_aborts_before_any_mutation() {
    let declared = snapshot(vec![
        app("a-first"),
        specification_with(
            ResourceKind::App,
            "foo",
            vec![RemoteSecretReference::new("db", "x")],
            Vec::new(),
        ),
    ]);
    let harness = Harness::new(declared, vec![live(&[("stale", true)])]);

    let result = harness.service.reconcile().await;

    assert!(
        result
            .as_ref()
            .is_err_and(|error| error.to_string().contains("secret not found \"x\""))
    );
    assert_eq!(harness.total_actions().await, 0);
}

#[tokio::test]
async fn resolved_secrets_and_registry_are_sent_to_remote() {
    let declared = snapshot(vec![specification_with(
        ResourceKind::App,
        "foo",
        vec![RemoteSecretReference::new("db", "remote-db")],
        Vec::new(),
    )]);
    let harness = Harness::with_options(
        declared,
        vec![live(&[]), live(&[("foo", true)])],
        Vec::new(),
        &[("remote-db", "s3cret")],
        Some(RegistryCredentials {
            server: "registry.example.com".to_owned(),
            username: "puller".to_owned(),
            password: "hunter2".to_owned(),
        }),
    );

    assert!(harness.service.reconcile().await.is_ok());

    let actions = harness.apps.actions.lock().await;
    let payload = actions
        .first()
        .and_then(|action| action.payload.clone())
        .unwrap_or_default();
    assert_eq!(
        payload["properties"]["configuration"]["secrets"],
        json!([
            {"name": "db", "value": "s3cret"},
            {"name": "azcagit-reg-cred", "value": "hunter2"}
        ])
    );
    assert_eq!(
        payload["properties"]["configuration"]["registries"][0]["server"],
        json!("registry.example.com")
    );
}

#[tokio::test]
async fn location_filtered_entry_is_never_touched() {
    let declared = snapshot(vec![specification_with(
        ResourceKind::App,
        "foo",
        Vec::new(),
        vec!["North Europe".to_owned()],
    )]);
    let harness = Harness::new(declared, vec![live(&[("foo", true)]), live(&[])]);

    assert!(harness.service.reconcile().await.is_ok());
    assert!(harness.apps.operations().await.is_empty());
    assert!(harness.fingerprints.entries.lock().await.is_empty());
}

#[tokio::test]
async fn matching_location_filter_is_applied() {
    let declared = snapshot(vec![specification_with(
        ResourceKind::App,
        "foo",
        Vec::new(),
        vec!["westeurope".to_owned()],
    )]);
    let harness = Harness::new(declared, vec![live(&[]), live(&[("foo", true)])]);

    assert!(harness.service.reconcile().await.is_ok());
    assert_eq!(
        harness.apps.operations().await,
        vec![("create", "foo".to_owned())]
    );
}

#[tokio::test]
async fn unchanged_resource_is_skipped_on_next_pass() {
    let harness = Harness::new(
        snapshot(vec![app("foo")]),
        vec![live(&[]), live(&[("foo", true)])],
    );

    assert!(harness.service.reconcile().await.is_ok());
    let second = harness.service.reconcile().await;

    assert!(second.is_ok_and(|report| report.actions.is_empty()));
    assert_eq!(
        harness.apps.operations().await,
        vec![("create", "foo".to_owned())]
    );
}

#[tokio::test]
async fn changed_specification_is_reapplied() {
    let harness = Harness::new(
        snapshot(vec![app("foo")]),
        vec![live(&[]), live(&[("foo", true)])],
    );
    assert!(harness.service.reconcile().await.is_ok());

    let changed = ResourceSpecification::new(ResourceSpecificationInput {
        kind: ResourceKind::App,
        api_version: "tidegate.io/v1".to_owned(),
        metadata: BTreeMap::from([("name".to_owned(), "foo".to_owned())]),
        payload: json!({"properties": {"configuration": {}, "template": {"containers": [{"name": "web"}]}}}),
        remote_secrets: Vec::new(),
        location_filter: Vec::new(),
        image_replacements: Vec::new(),
    })
    .unwrap_or_else(|_| unreachable!());
    *harness.source.snapshot.lock().await = snapshot(vec![changed]);

    let report = harness.service.reconcile().await;

    let actions = report.map(|report| report.actions).unwrap_or_default();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action_type, ReconcileActionType::Update);
    assert_eq!(actions[0].reason, Some(ChangeReason::SpecificationChanged));
}

#[tokio::test]
async fn resource_missing_after_apply_is_a_consistency_error() {
    let harness = Harness::new(snapshot(vec![app("foo")]), vec![live(&[]), live(&[])]);

    let result = harness.service.reconcile().await;

    assert!(matches!(
        &result,
        Err(AppError::Consistency(message)) if message == "unable to locate foo after create or update"
    ));
    assert!(harness.fingerprints.entries.lock().await.is_empty());
}

#[tokio::test]
async fn create_failure_stops_remaining_entries() {
    let harness = Harness::new(
        snapshot(vec![app("foo"), app("zoo")]),
        vec![live(&[]), live(&[("foo", true), ("zoo", true)])],
    );
    harness.apps.fail_on("create", "foo").await;

    let result = harness.service.reconcile().await;

    assert!(
        result
            .as_ref()
            .is_err_and(|error| error.to_string().contains("failed to create foo"))
    );
    assert!(harness.apps.operations().await.is_empty());
}

#[tokio::test]
async fn delete_failure_surfaces_resource_name() {
    let harness = Harness::new(snapshot(Vec::new()), vec![live(&[("foo", true)])]);
    harness.apps.fail_on("delete", "foo").await;

    let result = harness.service.reconcile().await;

    assert!(matches!(
        &result,
        Err(AppError::Remote(message)) if message.starts_with("failed to delete foo")
    ));
}

#[tokio::test]
async fn apps_and_jobs_are_reconciled_with_their_own_remotes() {
    let declared = snapshot(vec![
        app("foo"),
        specification_with(ResourceKind::Job, "nightly", Vec::new(), Vec::new()),
    ]);
    let harness = Harness::with_options(
        declared,
        vec![live(&[]), live(&[("foo", true)])],
        vec![live(&[("old-job", true)]), live(&[("nightly", true)])],
        &[],
        None,
    );

    let report = harness.service.reconcile().await;

    let kinds: Vec<ResourceKind> = report
        .map(|report| report.actions.iter().map(|action| action.kind).collect())
        .unwrap_or_default();
    assert_eq!(
        kinds,
        vec![ResourceKind::App, ResourceKind::Job, ResourceKind::Job]
    );
    assert_eq!(
        harness.jobs.operations().await,
        vec![
            ("delete", "old-job".to_owned()),
            ("create", "nightly".to_owned())
        ]
    );
}

#[tokio::test]
async fn repeated_identical_failure_notifies_once() {
    let mut declared = snapshot(Vec::new());
    declared.apps.insert_error("broken.json", "metadata.name is missing");
    let harness = Harness::new(declared, vec![live(&[])]);

    assert!(harness.service.reconcile().await.is_err());
    assert!(harness.service.reconcile().await.is_err());
    assert_eq!(harness.notifier.sent.lock().await.len(), 1);

    *harness.source.revision.lock().await = "rev-2".to_owned();
    assert!(harness.service.reconcile().await.is_err());
    assert_eq!(harness.notifier.sent.lock().await.len(), 2);
}

#[tokio::test]
async fn metrics_are_recorded_for_every_pass() {
    let harness = Harness::new(snapshot(vec![app("foo")]), vec![live(&[("foo", false)])]);

    assert!(harness.service.reconcile().await.is_err());

    assert_eq!(
        *harness.metrics.counts.lock().await,
        vec![(metric_names::RECONCILE_COUNT.to_owned(), 1)]
    );
    assert_eq!(
        *harness.metrics.durations.lock().await,
        vec![metric_names::RECONCILE_DURATION.to_owned()]
    );
    assert_eq!(
        *harness.metrics.successes.lock().await,
        vec![(metric_names::RECONCILE_SUCCESS.to_owned(), false)]
    );
}

#[tokio::test]
async fn notification_failure_does_not_mask_reconcile_error() {
    let harness = Harness::new(snapshot(vec![app("foo")]), vec![live(&[("foo", false)])]);
    *harness.notifier.fail.lock().await = true;

    let result = harness.service.reconcile().await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn notification_failure_is_returned_after_successful_pass() {
    let harness = Harness::new(snapshot(Vec::new()), vec![live(&[])]);
    *harness.notifier.fail.lock().await = true;

    let result = harness.service.reconcile().await;

    assert!(
        result
            .as_ref()
            .is_err_and(|error| error.to_string().contains("failed to send notification"))
    );
    assert_eq!(
        *harness.metrics.successes.lock().await,
        vec![(metric_names::RECONCILE_SUCCESS.to_owned(), true)]
    );
}
