use std::time::Duration;

use async_trait::async_trait;
use tidegate_core::AppResult;

/// Port for emitting reconciliation metrics.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Records an integer metric.
    async fn record_int(&self, name: &str, value: i64) -> AppResult<()>;

    /// Records a duration metric.
    async fn record_duration(&self, name: &str, value: Duration) -> AppResult<()>;

    /// Records a success flag metric.
    async fn record_success(&self, name: &str, success: bool) -> AppResult<()>;
}
