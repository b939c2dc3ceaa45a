use async_trait::async_trait;
use tidegate_core::AppResult;
use tidegate_domain::NotificationEvent;

/// Port for delivering pass outcome notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one notification event.
    async fn send(&self, event: &NotificationEvent) -> AppResult<()>;
}
