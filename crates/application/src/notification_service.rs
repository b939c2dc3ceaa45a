use std::sync::Arc;

use tidegate_core::AppResult;
use tidegate_domain::NotificationEvent;
use tracing::{debug, info};

use crate::reconcile_ports::{NotificationCache, Notifier};

/// Sends pass notifications, suppressing repeats of the last sent event.
#[derive(Clone)]
pub struct NotificationDeduplicator {
    cache: Arc<dyn NotificationCache>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDeduplicator {
    /// Creates a deduplicator over a cache and a notifier.
    #[must_use]
    pub fn new(cache: Arc<dyn NotificationCache>, notifier: Arc<dyn Notifier>) -> Self {
        Self { cache, notifier }
    }

    /// Sends `event` unless it equals the last sent event.
    ///
    /// Returns whether the event was sent. The event is remembered only after
    /// a successful send, so a failed send is retried on the next pass.
    pub async fn notify(&self, event: NotificationEvent) -> AppResult<bool> {
        let previous = self.cache.get().await?;
        if previous.as_ref() == Some(&event) {
            debug!(
                revision = %event.revision,
                state = event.state.as_str(),
                "suppressing duplicate notification"
            );
            return Ok(false);
        }

        self.notifier
            .send(&event)
            .await
            .map_err(|error| error.context("failed to send notification"))?;
        info!(
            revision = %event.revision,
            state = event.state.as_str(),
            "notification sent"
        );
        self.cache.set(event).await?;

        Ok(true)
    }
}
