use async_trait::async_trait;
use tidegate_application::Notifier;
use tidegate_core::AppResult;
use tidegate_domain::{NotificationEvent, NotificationState};
use tokio::sync::RwLock;

/// Notifier that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardNotifier;

#[async_trait]
impl Notifier for DiscardNotifier {
    async fn send(&self, _event: &NotificationEvent) -> AppResult<()> {
        Ok(())
    }
}

/// Notifier that records every event in memory.
#[derive(Default)]
pub struct InMemoryNotifier {
    events: RwLock<Vec<NotificationEvent>>,
}

impl InMemoryNotifier {
    /// Creates an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns recorded events in send order.
    pub async fn events(&self) -> Vec<NotificationEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, event: &NotificationEvent) -> AppResult<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

/// Notifier that writes events to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    /// Creates a logging notifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, event: &NotificationEvent) -> AppResult<()> {
        match event.state {
            NotificationState::Success => tracing::info!(
                revision = %event.revision,
                name = %event.name,
                description = %event.description,
                "reconciliation notification"
            ),
            NotificationState::Failure => tracing::warn!(
                revision = %event.revision,
                name = %event.name,
                description = %event.description,
                "reconciliation notification"
            ),
        }

        Ok(())
    }
}
