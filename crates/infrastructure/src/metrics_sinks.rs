use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tidegate_application::MetricsSink;
use tidegate_core::AppResult;
use tokio::sync::RwLock;

/// Recorded metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricValue {
    /// Integer value.
    Int(i64),
    /// Duration value.
    Duration(Duration),
    /// Success flag.
    Success(bool),
}

/// Metrics sink keeping every recorded value in memory, keyed by metric name.
#[derive(Default)]
pub struct InMemoryMetricsSink {
    values: RwLock<BTreeMap<String, Vec<MetricValue>>>,
}

impl InMemoryMetricsSink {
    /// Creates an empty metrics sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns recorded values for one metric.
    pub async fn values(&self, name: &str) -> Vec<MetricValue> {
        self.values
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    async fn record(&self, name: &str, value: MetricValue) {
        self.values
            .write()
            .await
            .entry(name.to_owned())
            .or_default()
            .push(value);
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn record_int(&self, name: &str, value: i64) -> AppResult<()> {
        self.record(name, MetricValue::Int(value)).await;
        Ok(())
    }

    async fn record_duration(&self, name: &str, value: Duration) -> AppResult<()> {
        self.record(name, MetricValue::Duration(value)).await;
        Ok(())
    }

    async fn record_success(&self, name: &str, success: bool) -> AppResult<()> {
        self.record(name, MetricValue::Success(success)).await;
        Ok(())
    }
}

/// Metrics sink emitting each value as a structured tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl TracingMetricsSink {
    /// Creates a tracing metrics sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricsSink for TracingMetricsSink {
    async fn record_int(&self, name: &str, value: i64) -> AppResult<()> {
        tracing::info!(target: "tidegate::metrics", metric = name, value, "metric");
        Ok(())
    }

    async fn record_duration(&self, name: &str, value: Duration) -> AppResult<()> {
        let value_ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(target: "tidegate::metrics", metric = name, value_ms, "metric");
        Ok(())
    }

    async fn record_success(&self, name: &str, success: bool) -> AppResult<()> {
        tracing::info!(target: "tidegate::metrics", metric = name, success, "metric");
        Ok(())
    }
}
