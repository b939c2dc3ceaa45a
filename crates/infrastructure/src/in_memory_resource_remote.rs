use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tidegate_application::ResourceRemote;
use tidegate_core::{AppError, AppResult};
use tidegate_domain::{LiveResource, LiveState, ResourceKind, ResourceSpecification};
use tokio::sync::RwLock;

/// Mutating remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    /// Create call.
    Create,
    /// Update call.
    Update,
    /// Delete call.
    Delete,
}

/// One recorded mutating call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAction {
    /// Operation called.
    pub operation: RemoteOperation,
    /// Target resource name.
    pub name: String,
    /// Payload sent with create and update calls.
    pub payload: Option<Value>,
}

#[derive(Default)]
struct RemoteState {
    resources: BTreeMap<String, LiveResource>,
    scripted_reads: VecDeque<AppResult<LiveState>>,
    failures: HashMap<RemoteOperation, String>,
    actions: Vec<RemoteAction>,
}

/// In-memory remote platform for one resource kind.
///
/// Applied payloads become live resources stamped with the current time.
/// Scripted reads take precedence over the simulated state until consumed.
pub struct InMemoryResourceRemote {
    kind: ResourceKind,
    state: RwLock<RemoteState>,
}

impl InMemoryResourceRemote {
    /// Creates an empty remote for `kind`.
    #[must_use]
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            state: RwLock::new(RemoteState::default()),
        }
    }

    /// Adds a live resource without recording an action.
    pub async fn seed(&self, resource: LiveResource) {
        self.state
            .write()
            .await
            .resources
            .insert(resource.name().to_owned(), resource);
    }

    /// Queues the result returned by the next unscripted `list` call.
    pub async fn script_read(&self, result: AppResult<LiveState>) {
        self.state.write().await.scripted_reads.push_back(result);
    }

    /// Makes every call of `operation` fail with `message`.
    pub async fn fail(&self, operation: RemoteOperation, message: impl Into<String>) {
        self.state
            .write()
            .await
            .failures
            .insert(operation, message.into());
    }

    /// Returns recorded mutating calls in call order.
    pub async fn actions(&self) -> Vec<RemoteAction> {
        self.state.read().await.actions.clone()
    }

    /// Clears recorded mutating calls.
    pub async fn reset_actions(&self) {
        self.state.write().await.actions.clear();
    }

    async fn apply(
        &self,
        operation: RemoteOperation,
        name: &str,
        payload: Option<&Value>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.actions.push(RemoteAction {
            operation,
            name: name.to_owned(),
            payload: payload.cloned(),
        });

        if let Some(message) = state.failures.get(&operation) {
            return Err(AppError::Remote(message.clone()));
        }

        match payload {
            Some(payload) => {
                let resource = LiveResource::from_remote_payload(name, payload.clone())
                    .with_last_modified_at(Utc::now());
                state.resources.insert(name.to_owned(), resource);
            }
            None => {
                state.resources.remove(name);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ResourceRemote for InMemoryResourceRemote {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn list(&self) -> AppResult<LiveState> {
        let mut state = self.state.write().await;
        if let Some(result) = state.scripted_reads.pop_front() {
            return result;
        }

        Ok(state.resources.values().cloned().collect())
    }

    async fn create(&self, name: &str, specification: &ResourceSpecification) -> AppResult<()> {
        self.apply(RemoteOperation::Create, name, Some(specification.payload()))
            .await
    }

    async fn update(&self, name: &str, specification: &ResourceSpecification) -> AppResult<()> {
        self.apply(RemoteOperation::Update, name, Some(specification.payload()))
            .await
    }

    async fn delete(&self, name: &str) -> AppResult<()> {
        self.apply(RemoteOperation::Delete, name, None).await
    }
}
