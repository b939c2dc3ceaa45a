use super::*;

impl ReconcileService {
    /// Runs one reconciliation pass, then notifies and records metrics.
    ///
    /// Returns the reconciliation error when the pass failed. A notification
    /// failure is returned only when the pass itself succeeded.
    pub async fn reconcile(&self) -> AppResult<PassReport> {
        let started_at = Instant::now();
        let (revision, result) = self.run_pass().await;

        let notification_name = self.config.notification_name.as_str();
        let event = match &result {
            Ok(_) => NotificationEvent::success(revision.as_str(), notification_name),
            Err(error) => {
                NotificationEvent::failure(revision.as_str(), notification_name, error.to_string())
            }
        };
        let notify_result = self.notify(event).await;
        self.record_metrics(started_at, result.is_ok()).await;

        match (result, notify_result) {
            (Ok(report), Ok(())) => {
                info!(
                    revision = %report.revision,
                    actions = report.actions.len(),
                    "reconciliation finished"
                );
                Ok(report)
            }
            (Ok(_), Err(notify_error)) => Err(notify_error),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(notify_error)) => {
                warn!(error = %notify_error, "failed to send failure notification");
                Err(error)
            }
        }
    }

    async fn run_pass(&self) -> (String, AppResult<PassReport>) {
        let DeclaredSource {
            mut snapshot,
            revision,
        } = match self.source.fetch().await {
            Ok(source) => source,
            Err(error) => {
                return (
                    String::new(),
                    Err(error.context("failed to get declared state")),
                );
            }
        };

        if let Some(error) = snapshot.error() {
            return (
                revision,
                Err(AppError::Validation(format!(
                    "declared state contains errors, stopping reconciliation: {error}"
                ))),
            );
        }

        let result = self
            .converge(&mut snapshot)
            .await
            .map(|actions| PassReport {
                revision: revision.clone(),
                actions,
            });

        (revision, result)
    }

    async fn notify(&self, event: NotificationEvent) -> AppResult<()> {
        let Some(notifications) = &self.notifications else {
            return Ok(());
        };

        notifications.notify(event).await.map(|_| ())
    }

    async fn record_metrics(&self, started_at: Instant, success: bool) {
        let Some(metrics) = &self.metrics else {
            return;
        };

        if let Err(error) = metrics.record_int(metric_names::RECONCILE_COUNT, 1).await {
            warn!(%error, metric = metric_names::RECONCILE_COUNT, "failed to record metric");
        }
        if let Err(error) = metrics
            .record_duration(metric_names::RECONCILE_DURATION, started_at.elapsed())
            .await
        {
            warn!(%error, metric = metric_names::RECONCILE_DURATION, "failed to record metric");
        }
        if let Err(error) = metrics
            .record_success(metric_names::RECONCILE_SUCCESS, success)
            .await
        {
            warn!(%error, metric = metric_names::RECONCILE_SUCCESS, "failed to record metric");
        }
    }
}
